//! Per-day gram counts to fixed-width sparse feature vectors.

pub mod hashed;
pub mod pivoted;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    config::{FeatureConfig, VectorizerKind},
    data::gram_count::GramCountTable,
    error::{ModelError, PhrasecastResult},
};

pub use hashed::HashedVectorizer;
pub use pivoted::PivotedVectorizer;

// ================================================================================================
// Sparse Vector
// ================================================================================================

/// Sparse row of `(column, value)` pairs, sorted by column, no duplicates, no zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

impl SparseVector {
    /// Sums values of repeated columns and drops zeros.
    pub fn from_pairs<I: IntoIterator<Item = (u32, f64)>>(pairs: I) -> Self {
        let mut acc: BTreeMap<u32, f64> = BTreeMap::new();
        for (index, value) in pairs {
            *acc.entry(index).or_default() += value;
        }
        Self {
            entries: acc.into_iter().filter(|(_, v)| *v != 0.0).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> f64 {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// Fails if any column is outside `0..width`.
    pub fn check_width(&self, width: usize) -> Result<(), ModelError> {
        match self.entries.last() {
            Some((index, _)) if *index as usize >= width => Err(ModelError::FeatureOutOfRange {
                index: *index as usize,
                width,
            }),
            _ => Ok(()),
        }
    }
}

// ================================================================================================
// Feature Table
// ================================================================================================

/// One feature vector per distinct gram date, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    width: usize,
    signature: String,
    rows: BTreeMap<NaiveDate, SparseVector>,
}

impl FeatureTable {
    pub fn new(width: usize, signature: String, rows: BTreeMap<NaiveDate, SparseVector>) -> Self {
        Self {
            width,
            signature,
            rows,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Identifies the column layout. Models fitted on a table with a different
    /// signature cannot be applied to this one.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&SparseVector> {
        self.rows.get(&date)
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.keys().copied().collect()
    }

    pub fn latest(&self) -> Option<(NaiveDate, &SparseVector)> {
        self.rows.last_key_value().map(|(d, v)| (*d, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &SparseVector)> {
        self.rows.iter()
    }
}

// ================================================================================================
// Vectorizers
// ================================================================================================

pub trait Vectorizer {
    fn vectorize(&self, grams: &GramCountTable) -> PhrasecastResult<FeatureTable>;
}

/// The vectorizer selected by [`FeatureConfig`].
#[derive(Debug, Clone)]
pub enum FeatureVectorizer {
    Hashed(HashedVectorizer),
    Pivoted(PivotedVectorizer),
}

impl FeatureVectorizer {
    pub fn from_config(config: &FeatureConfig) -> PhrasecastResult<Self> {
        let fingerprint = config.fingerprint()?;
        Ok(match config.vectorizer {
            VectorizerKind::Hashed { width } => Self::Hashed(HashedVectorizer::new(width, fingerprint)),
            VectorizerKind::Pivoted => Self::Pivoted(PivotedVectorizer::new(fingerprint)),
        })
    }
}

impl Vectorizer for FeatureVectorizer {
    #[tracing::instrument(skip_all, fields(rows = grams.len()))]
    fn vectorize(&self, grams: &GramCountTable) -> PhrasecastResult<FeatureTable> {
        let table = match self {
            Self::Hashed(v) => v.vectorize(grams),
            Self::Pivoted(v) => v.vectorize(grams),
        }?;
        tracing::debug!(dates = table.len(), width = table.width(), "Vectorized gram counts");
        Ok(table)
    }
}
