use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::data::prediction_record::PredictionTable;

/// Counters describing one prediction merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionMergeStats {
    /// Existing rows dropped because their date has no market data.
    pub evicted: usize,
    pub inserted: usize,
    pub replaced: usize,
}

/// Merges newly computed predictions into the persisted series.
///
/// Existing rows whose date is not in `valid_dates` are dropped first; such a
/// row was a pending forecast for a day that turned out to have no prices.
/// Incoming rows then override existing rows of the same date. Incoming rows
/// are never evicted, so the latest pending forecast survives.
#[tracing::instrument(skip_all, fields(existing = existing.len(), incoming = incoming.len()))]
pub fn merge(
    mut existing: PredictionTable,
    incoming: PredictionTable,
    valid_dates: &BTreeSet<NaiveDate>,
) -> (PredictionTable, PredictionMergeStats) {
    let evicted = existing.retain(|date, _| valid_dates.contains(date));
    let merge = existing.merge_override_last(incoming);

    let stats = PredictionMergeStats {
        evicted,
        inserted: merge.inserted,
        replaced: merge.collided,
    };
    tracing::info!(
        evicted = stats.evicted,
        inserted = stats.inserted,
        replaced = stats.replaced,
        total = existing.len(),
        "Merged predictions"
    );
    (existing, stats)
}
