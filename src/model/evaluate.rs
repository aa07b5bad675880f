use ndarray::ArrayView2;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    align::TrainingSet,
    error::{ModelError, PhrasecastResult},
    model::regressor::Regressor,
};

/// Hold-out scores of one fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean squared error, averaged uniformly over outputs.
    pub mse: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Fits on a seeded random split of `set` and scores the held-out rows.
///
/// The test share is `ceil(test_fraction · n)`, at least one row, leaving at
/// least one training row. This is a diagnostic: the split ignores time order.
#[tracing::instrument(skip(regressor, set), fields(rows = set.len()))]
pub fn evaluate<R: Regressor>(
    regressor: &R,
    set: &TrainingSet,
    test_fraction: f64,
    seed: u64,
) -> PhrasecastResult<Evaluation> {
    let n = set.len();
    if n < 2 {
        return Err(ModelError::InsufficientData(format!(
            "evaluation needs at least 2 aligned rows, got {n}"
        ))
        .into());
    }

    let test_rows = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = indices.split_at(test_rows);

    let (train_x, train_y) = set.select(train_idx);
    let (test_x, test_y) = set.select(test_idx);

    let model = regressor.fit(&train_x, set.width(), train_y.view())?;
    let mut predicted = Vec::with_capacity(test_rows);
    for x in &test_x {
        predicted.push(regressor.predict(&model, x)?);
    }

    let mse = mean_squared_error(test_y.view(), &predicted);
    let evaluation = Evaluation {
        mse,
        rmse: mse.sqrt(),
        train_rows: train_idx.len(),
        test_rows,
    };
    tracing::info!(mse = evaluation.mse, rmse = evaluation.rmse, "Evaluated model");
    Ok(evaluation)
}

/// Mean of squared residuals over every cell, which equals the uniform average
/// of per-output MSEs since every output has the same number of rows.
pub fn mean_squared_error(actual: ArrayView2<'_, f64>, predicted: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut cells = 0usize;
    for (row, p) in actual.rows().into_iter().zip(predicted) {
        for (a, b) in row.iter().zip(p) {
            total += (a - b) * (a - b);
            cells += 1;
        }
    }
    if cells == 0 { 0.0 } else { total / cells as f64 }
}
