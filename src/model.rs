//! Regression capability, the concrete least-squares fit and its persisted form.

pub mod evaluate;
pub mod linalg;
pub mod linear;
pub mod regressor;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::domain::Symbol;

pub use evaluate::{Evaluation, evaluate};
pub use linear::{LinearModel, LinearRegression};
pub use regressor::Regressor;

/// A fitted model together with what it was fitted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    /// Feature table signature; a mismatch means the columns mean something else.
    pub signature: String,
    /// Output order of the model.
    pub symbols: Vec<Symbol>,
    /// Latest outcome date in the training data.
    pub trained_through: Option<NaiveDate>,
    pub model: LinearModel,
}

impl SavedModel {
    pub const TABLE: &'static str = "model";

    /// Whether this model can be applied to features with `signature` and outputs `symbols`.
    pub fn is_compatible(&self, signature: &str, symbols: &[Symbol]) -> bool {
        self.signature == signature && self.symbols == symbols
    }
}
