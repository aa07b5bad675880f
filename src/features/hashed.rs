use std::collections::BTreeMap;

use crate::{
    data::gram_count::GramCountTable,
    error::{ConfigError, PhrasecastResult},
    features::{FeatureTable, SparseVector},
};

/// Hashed-sum vectorization into a fixed number of buckets.
///
/// The bucket of a gram is the first eight bytes of its blake3 digest,
/// little endian, modulo the width. Buckets do not depend on the process or
/// the platform, so a persisted model stays applicable.
#[derive(Debug, Clone)]
pub struct HashedVectorizer {
    width: usize,
    fingerprint: String,
}

impl HashedVectorizer {
    pub fn new(width: usize, fingerprint: String) -> Self {
        Self { width, fingerprint }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn bucket(&self, gram: &str) -> u32 {
        let digest = blake3::hash(gram.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(head) % self.width as u64) as u32
    }

    pub fn vectorize(&self, grams: &GramCountTable) -> PhrasecastResult<FeatureTable> {
        if self.width == 0 || self.width > u32::MAX as usize {
            return Err(ConfigError::InvalidFeatureWidth(self.width).into());
        }

        let rows: BTreeMap<_, _> = grams
            .by_day()
            .into_iter()
            .map(|(date, day)| {
                let vector = SparseVector::from_pairs(
                    day.into_iter()
                        .map(|(gram, count)| (self.bucket(gram), count as f64)),
                );
                (date, vector)
            })
            .collect();

        Ok(FeatureTable::new(self.width, self.fingerprint.clone(), rows))
    }
}
