use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, PhrasecastResult},
    features::SparseVector,
    model::{linalg::pinv_solve, regressor::Regressor},
};

/// Fitted linear map from sparse features to outputs, in original feature units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    width: usize,
    /// Non-zero coefficient rows keyed by feature column, one value per output.
    coefficients: BTreeMap<u32, Vec<f64>>,
    intercept: Vec<f64>,
}

impl LinearModel {
    /// A model that predicts zero for every output.
    pub fn zeros(width: usize, outputs: usize) -> Self {
        Self {
            width,
            coefficients: BTreeMap::new(),
            intercept: vec![0.0; outputs],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn outputs(&self) -> usize {
        self.intercept.len()
    }

    pub fn intercept(&self) -> &[f64] {
        &self.intercept
    }

    pub fn coefficient(&self, column: u32) -> Option<&[f64]> {
        self.coefficients.get(&column).map(Vec::as_slice)
    }

    pub fn apply(&self, x: &SparseVector) -> Result<Vec<f64>, ModelError> {
        x.check_width(self.width)?;
        let mut out = self.intercept.clone();
        for (column, value) in x.iter() {
            if let Some(coef) = self.coefficients.get(&column) {
                for (o, c) in out.iter_mut().zip(coef) {
                    *o += c * value;
                }
            }
        }
        Ok(out)
    }
}

/// Ordinary least squares with optional column standardization and intercept.
///
/// Equivalent to standard-scaling the columns (population std, zero-variance
/// columns left unscaled) and fitting a minimum-norm least-squares regression.
///
/// The fit is solved in the dual: with `n` rows the centered, scaled Gram
/// matrix `K = Xc W Xcᵀ` is `n × n`, and `α = K⁺ Yc`. Coefficients in original
/// units are `β = W Xcᵀ α`. Only columns that are non-zero in some row are
/// touched, so the cost does not depend on the hashed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRegression {
    pub standardize: bool,
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            standardize: true,
            fit_intercept: true,
        }
    }
}

/// Column statistics over the active columns of the training rows.
struct ColumnStats {
    /// `(row, value)` entries per column.
    entries: BTreeMap<u32, Vec<(usize, f64)>>,
    mean: BTreeMap<u32, f64>,
    weight: BTreeMap<u32, f64>,
}

impl ColumnStats {
    fn new(features: &[SparseVector], center: bool, standardize: bool) -> Self {
        let n = features.len() as f64;
        let mut entries: BTreeMap<u32, Vec<(usize, f64)>> = BTreeMap::new();
        for (row, x) in features.iter().enumerate() {
            for (column, value) in x.iter() {
                entries.entry(column).or_default().push((row, value));
            }
        }

        let mut mean = BTreeMap::new();
        let mut weight = BTreeMap::new();
        for (column, cells) in &entries {
            let m = cells.iter().map(|(_, v)| v).sum::<f64>() / n;
            let w = if standardize {
                let zeros = n - cells.len() as f64;
                let var = (cells.iter().map(|(_, v)| (v - m) * (v - m)).sum::<f64>() + zeros * m * m) / n;
                if var > (f64::EPSILON * m).powi(2) * n {
                    1.0 / var
                } else {
                    1.0
                }
            } else {
                1.0
            };
            mean.insert(*column, if center { m } else { 0.0 });
            weight.insert(*column, w);
        }

        Self {
            entries,
            mean,
            weight,
        }
    }

    fn mean(&self, column: u32) -> f64 {
        self.mean.get(&column).copied().unwrap_or(0.0)
    }

    fn weight(&self, column: u32) -> f64 {
        self.weight.get(&column).copied().unwrap_or(1.0)
    }

    /// `K[i,k] = Σ_j w_j (x_ij − m_j)(x_kj − m_j)`.
    fn centered_gram(&self, features: &[SparseVector]) -> Array2<f64> {
        let n = features.len();
        let mut gram = Array2::<f64>::zeros((n, n));
        for (column, cells) in &self.entries {
            let w = self.weight(*column);
            for (a, (i, xi)) in cells.iter().enumerate() {
                for (k, xk) in &cells[a..] {
                    gram[[*i, *k]] += w * xi * xk;
                }
            }
        }
        for i in 0..n {
            for k in 0..i {
                gram[[i, k]] = gram[[k, i]];
            }
        }

        // a_i = Σ_j w_j x_ij m_j, c = Σ_j w_j m_j²
        let cross: Array1<f64> = features
            .iter()
            .map(|x| x.iter().map(|(j, v)| self.weight(j) * v * self.mean(j)).sum::<f64>())
            .collect();
        let c: f64 = self
            .mean
            .iter()
            .map(|(j, m)| self.weight(*j) * m * m)
            .sum();

        for i in 0..n {
            for k in 0..n {
                gram[[i, k]] += c - cross[i] - cross[k];
            }
        }
        gram
    }
}

impl LinearRegression {
    pub fn new(standardize: bool, fit_intercept: bool) -> Self {
        Self {
            standardize,
            fit_intercept,
        }
    }

    fn validate(features: &[SparseVector], width: usize, outcomes: ArrayView2<'_, f64>) -> Result<(), ModelError> {
        if features.len() != outcomes.nrows() {
            return Err(ModelError::DimensionMismatch {
                expected: features.len(),
                got: outcomes.nrows(),
            });
        }
        for x in features {
            x.check_width(width)?;
        }
        if let Some(((row, column), _)) = outcomes.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ModelError::NonFiniteOutcome { row, column });
        }
        Ok(())
    }
}

impl Regressor for LinearRegression {
    type Model = LinearModel;

    fn fit(
        &self,
        features: &[SparseVector],
        width: usize,
        outcomes: ArrayView2<'_, f64>,
    ) -> PhrasecastResult<LinearModel> {
        Self::validate(features, width, outcomes)?;
        let outputs = outcomes.ncols();
        if features.is_empty() {
            return Ok(LinearModel::zeros(width, outputs));
        }

        let stats = ColumnStats::new(features, self.standardize || self.fit_intercept, self.standardize);

        let y_mean = if self.fit_intercept {
            outcomes
                .mean_axis(Axis(0))
                .ok_or_else(|| ModelError::Computation("mean of empty outcome matrix".into()))?
        } else {
            Array1::zeros(outputs)
        };
        let y_centered = &outcomes - &y_mean;

        let gram = stats.centered_gram(features);
        let alpha = pinv_solve(gram.view(), y_centered.view())?;
        let alpha_sum = alpha.sum_axis(Axis(0));

        // β_j = w_j (Σ_i α_i x_ij − m_j Σ_i α_i)
        let mut coefficients = BTreeMap::new();
        let mut intercept = y_mean.to_vec();
        for (column, cells) in &stats.entries {
            let w = stats.weight(*column);
            let m = stats.mean(*column);
            let mut beta = vec![0.0; outputs];
            for (row, value) in cells {
                for (b, a) in beta.iter_mut().zip(alpha.row(*row)) {
                    *b += a * value;
                }
            }
            for (b, s) in beta.iter_mut().zip(alpha_sum.iter()) {
                *b = w * (*b - m * s);
            }
            if beta.iter().all(|b| *b == 0.0) {
                continue;
            }
            for (i, b) in intercept.iter_mut().zip(&beta) {
                *i -= b * m;
            }
            coefficients.insert(*column, beta);
        }

        if intercept.iter().chain(coefficients.values().flatten()).any(|v| !v.is_finite()) {
            return Err(ModelError::Computation("least squares produced non-finite coefficients".into()).into());
        }

        tracing::trace!(rows = features.len(), active = coefficients.len(), "Fitted linear model");
        Ok(LinearModel {
            width,
            coefficients,
            intercept,
        })
    }

    fn predict(&self, model: &LinearModel, features: &SparseVector) -> PhrasecastResult<Vec<f64>> {
        Ok(model.apply(features)?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn row(pairs: &[(u32, f64)]) -> SparseVector {
        SparseVector::from_pairs(pairs.iter().copied())
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-8, "{a} != {b}");
    }

    #[test]
    fn recovers_exact_linear_relation() {
        // y0 = 2 x0 - x1 + 1, y1 = 0.5 x1
        let xs = vec![
            row(&[(0, 1.0), (1, 2.0)]),
            row(&[(0, 2.0), (1, 1.0)]),
            row(&[(0, 3.0), (1, 5.0)]),
            row(&[(0, 4.0), (1, 3.0)]),
            row(&[(0, 0.5)]),
        ];
        let ys = array![
            [1.0, 1.0],
            [4.0, 0.5],
            [2.0, 2.5],
            [6.0, 1.5],
            [2.0, 0.0]
        ];

        for reg in [LinearRegression::new(true, true), LinearRegression::new(false, true)] {
            let model = reg.fit(&xs, 10, ys.view()).expect("fit");
            let pred = reg.predict(&model, &row(&[(0, 10.0), (1, 1.0)])).expect("predict");
            assert_close(pred[0], 20.0);
            assert_close(pred[1], 0.5);
            assert_close(model.intercept()[0], 1.0);
        }
    }

    #[test]
    fn fit_without_intercept_passes_through_origin() {
        let xs = vec![row(&[(3, 1.0)]), row(&[(3, 2.0)]), row(&[(3, 4.0)])];
        let ys = array![[3.0], [6.0], [12.0]];
        let reg = LinearRegression::new(false, false);
        let model = reg.fit(&xs, 5, ys.view()).expect("fit");

        assert_close(model.intercept()[0], 0.0);
        assert_close(model.coefficient(3).map(|c| c[0]).unwrap_or_default(), 3.0);
    }

    #[test]
    fn underdetermined_fit_interpolates_training_rows() {
        // Two rows, many columns: the fit must not fail and must reproduce the data.
        let xs = vec![
            row(&[(0, 1.0), (7, 3.0), (42, 2.0)]),
            row(&[(1, 5.0), (7, 1.0), (99, 4.0)]),
        ];
        let ys = array![[0.7], [-1.3]];
        let reg = LinearRegression::default();
        let model = reg.fit(&xs, 100, ys.view()).expect("fit");

        for (x, y) in xs.iter().zip(ys.column(0)) {
            assert_close(reg.predict(&model, x).expect("predict")[0], *y);
        }
    }

    #[test]
    fn standardized_and_raw_fits_agree_when_determined() {
        let xs = vec![
            row(&[(0, 1.0), (1, 10.0)]),
            row(&[(0, 2.0), (1, 30.0)]),
            row(&[(0, 3.0), (1, 20.0)]),
            row(&[(0, 5.0), (1, 60.0)]),
        ];
        let ys = array![[1.0], [3.5], [2.0], [7.5]];
        let probe = row(&[(0, 4.0), (1, 15.0)]);

        let a = LinearRegression::new(true, true);
        let b = LinearRegression::new(false, true);
        let pa = a.predict(&a.fit(&xs, 2, ys.view()).expect("fit"), &probe).expect("predict");
        let pb = b.predict(&b.fit(&xs, 2, ys.view()).expect("fit"), &probe).expect("predict");
        assert_close(pa[0], pb[0]);
    }

    #[test]
    fn single_row_predicts_its_outcome() {
        let xs = vec![row(&[(2, 4.0)])];
        let ys = array![[0.25, -0.5]];
        let reg = LinearRegression::default();
        let model = reg.fit(&xs, 3, ys.view()).expect("fit");

        assert_eq!(model.intercept(), &[0.25, -0.5]);
        assert_eq!(reg.predict(&model, &row(&[(0, 9.0)])).expect("predict"), vec![0.25, -0.5]);
    }

    #[test]
    fn empty_training_set_predicts_zeros() {
        let reg = LinearRegression::default();
        let model = reg.fit(&[], 3, Array2::zeros((0, 2)).view()).expect("fit");
        assert_eq!(reg.predict(&model, &row(&[(1, 1.0)])).expect("predict"), vec![0.0, 0.0]);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let reg = LinearRegression::default();
        let xs = vec![row(&[(5, 1.0)])];
        assert!(reg.fit(&xs, 3, array![[1.0]].view()).is_err());
        assert!(reg.fit(&xs, 10, array![[1.0], [2.0]].view()).is_err());
        assert!(reg.fit(&xs, 10, array![[f64::NAN]].view()).is_err());
    }
}
