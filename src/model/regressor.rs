use ndarray::ArrayView2;

use crate::{error::PhrasecastResult, features::SparseVector};

/// Fits a model from sparse feature rows to multi-output outcomes and applies it.
///
/// `outcomes` has one row per feature row and one column per output. Fitting
/// on zero rows must succeed; early walk-forward steps have no history.
pub trait Regressor {
    type Model;

    fn fit(
        &self,
        features: &[SparseVector],
        width: usize,
        outcomes: ArrayView2<'_, f64>,
    ) -> PhrasecastResult<Self::Model>;

    fn predict(&self, model: &Self::Model, features: &SparseVector) -> PhrasecastResult<Vec<f64>>;
}
