pub mod frame;

use std::{
    collections::{BTreeMap, btree_map::Entry},
    ops::AddAssign,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// How a repeated key is resolved when a batch is merged into a table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MergePolicy {
    /// Values for identical keys are added.
    Sum,
    /// The incoming value replaces the stored one.
    OverrideLast,
}

/// Outcome counters of a single merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    /// Keys that were not present before the merge.
    pub inserted: usize,
    /// Keys that were present and got summed or replaced.
    pub collided: usize,
}

/// A key-deduplicated table kept in key order.
///
/// This is the in-memory form of every persisted table. There is at most one
/// value per key; [`MergePolicy`] decides what happens on collision.
///
/// # Examples
///
/// ```rust
/// # use phrasecast::store::SeriesTable;
/// let mut counts: SeriesTable<&str, u64> = SeriesTable::from_rows([("a", 1), ("b", 2)]);
/// counts.merge_sum([("a", 4), ("c", 1)]);
/// assert_eq!(counts.get(&"a"), Some(&5));
///
/// let mut latest: SeriesTable<&str, u64> = SeriesTable::from_rows([("a", 1)]);
/// latest.merge_override_last([("a", 4), ("a", 7)]);
/// assert_eq!(latest.get(&"a"), Some(&7));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable<K: Ord, V> {
    rows: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for SeriesTable<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<K: Ord, V> SeriesTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from rows in supply order; a repeated key keeps the later row.
    pub fn from_rows<I: IntoIterator<Item = (K, V)>>(rows: I) -> Self {
        let mut table = Self::new();
        table.merge_override_last(rows);
        table
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.rows.iter()
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> {
        self.rows.keys()
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.rows.last_key_value()
    }

    pub fn as_map(&self) -> &BTreeMap<K, V> {
        &self.rows
    }

    pub fn into_map(self) -> BTreeMap<K, V> {
        self.rows
    }

    /// Keeps only the rows for which `keep` returns `true`. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|k, v| keep(k, v));
        before - self.rows.len()
    }

    /// Concatenates `incoming` after the stored rows and keeps the last row per key.
    pub fn merge_override_last<I: IntoIterator<Item = (K, V)>>(&mut self, incoming: I) -> MergeStats {
        let mut stats = MergeStats::default();
        for (key, value) in incoming {
            match self.rows.insert(key, value) {
                Some(_) => stats.collided += 1,
                None => stats.inserted += 1,
            }
        }
        stats
    }
}

impl<K: Ord, V: AddAssign> SeriesTable<K, V> {
    /// Adds incoming values onto stored values for identical keys.
    ///
    /// Re-merging the same batch double counts; callers feed only rows that
    /// have not been merged before.
    pub fn merge_sum<I: IntoIterator<Item = (K, V)>>(&mut self, incoming: I) -> MergeStats {
        let mut stats = MergeStats::default();
        for (key, value) in incoming {
            match self.rows.entry(key) {
                Entry::Occupied(mut slot) => {
                    *slot.get_mut() += value;
                    stats.collided += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(value);
                    stats.inserted += 1;
                }
            }
        }
        stats
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SeriesTable<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_rows(iter)
    }
}

impl<K: Ord, V> IntoIterator for SeriesTable<K, V> {
    type Item = (K, V);
    type IntoIter = std::collections::btree_map::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_values_for_shared_keys() {
        let mut table: SeriesTable<(u32, &str), u64> =
            SeriesTable::from_rows([((1, "a"), 2), ((1, "b"), 3)]);
        let stats = table.merge_sum([((1, "a"), 5), ((2, "a"), 1)]);

        assert_eq!(stats, MergeStats { inserted: 1, collided: 1 });
        assert_eq!(table.get(&(1, "a")), Some(&7));
        assert_eq!(table.get(&(1, "b")), Some(&3));
        assert_eq!(table.get(&(2, "a")), Some(&1));
    }

    #[test]
    fn sum_of_disjoint_batches_equals_sum_of_parts() {
        let batch_a = [((1, "x"), 2u64), ((2, "y"), 1)];
        let batch_b = [((1, "x"), 3u64), ((3, "z"), 4)];

        let mut ab: SeriesTable<(u32, &str), u64> = SeriesTable::new();
        ab.merge_sum(batch_a);
        ab.merge_sum(batch_b);

        let mut ba: SeriesTable<(u32, &str), u64> = SeriesTable::new();
        ba.merge_sum(batch_b);
        ba.merge_sum(batch_a);

        assert_eq!(ab, ba);
        assert_eq!(ab.get(&(1, "x")), Some(&5));
    }

    #[test]
    fn override_last_keeps_latest_supplied_value() {
        let mut table: SeriesTable<u32, &str> = SeriesTable::from_rows([(1, "old"), (2, "keep")]);
        let stats = table.merge_override_last([(1, "mid"), (3, "new"), (1, "newest")]);

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.collided, 2);
        assert_eq!(table.get(&1), Some(&"newest"));
        assert_eq!(table.get(&2), Some(&"keep"));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn override_last_is_idempotent() {
        let batch = [(1u32, 10.0f64), (2, 20.0)];
        let mut once: SeriesTable<u32, f64> = SeriesTable::from_rows([(0, 1.0)]);
        once.merge_override_last(batch);
        let mut twice = once.clone();
        twice.merge_override_last(batch);

        assert_eq!(once, twice);
    }

    #[test]
    fn retain_reports_removed_rows() {
        let mut table: SeriesTable<u32, u64> = (0..10).map(|k| (k, k as u64)).collect();
        let removed = table.retain(|_, v| *v > 1);

        assert_eq!(removed, 2);
        assert_eq!(table.keys().next(), Some(&2));
    }
}
