use std::collections::{BTreeMap, HashMap};

use crate::{
    data::gram_count::GramCountTable,
    error::{ModelError, PhrasecastResult},
    features::{FeatureTable, SparseVector},
};

/// One column per distinct gram across the whole table.
///
/// Columns are the sorted vocabulary, so adding a gram shifts the columns of
/// every gram that sorts after it. The table signature therefore covers the
/// vocabulary as well as the configuration.
#[derive(Debug, Clone)]
pub struct PivotedVectorizer {
    fingerprint: String,
}

impl PivotedVectorizer {
    pub fn new(fingerprint: String) -> Self {
        Self { fingerprint }
    }

    pub fn vectorize(&self, grams: &GramCountTable) -> PhrasecastResult<FeatureTable> {
        let vocabulary = grams.vocabulary();
        if vocabulary.len() > u32::MAX as usize {
            return Err(ModelError::FeatureOutOfRange {
                index: vocabulary.len(),
                width: u32::MAX as usize,
            }
            .into());
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.fingerprint.as_bytes());
        for gram in &vocabulary {
            hasher.update(gram.as_bytes());
            hasher.update(b"\n");
        }
        let signature = hasher.finalize().to_hex().to_string();

        let columns: HashMap<&str, u32> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, g)| (*g, i as u32))
            .collect();

        let rows: BTreeMap<_, _> = grams
            .by_day()
            .into_iter()
            .map(|(date, day)| {
                let vector = SparseVector::from_pairs(
                    day.into_iter()
                        .filter_map(|(gram, count)| columns.get(gram).map(|c| (*c, count as f64))),
                );
                (date, vector)
            })
            .collect();

        Ok(FeatureTable::new(vocabulary.len(), signature, rows))
    }
}
