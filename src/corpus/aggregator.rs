use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::{
    config::CorpusConfig,
    corpus::tokenizer::{Tokenizer, Tokens},
    data::{
        domain::RawComment,
        gram_count::{GramCountTable, GramKey},
    },
    error::PhrasecastResult,
};

/// Persisted state owned by the aggregator: the gram table and its checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusState {
    pub grams: GramCountTable,
    /// Latest raw timestamp already folded into `grams`.
    pub checkpoint: Option<NaiveDateTime>,
}

/// Counters describing one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Rows newer than the checkpoint.
    pub new_rows: usize,
    /// New rows skipped for missing or sentinel text.
    pub malformed: usize,
    /// New rows with fewer than two usable tokens.
    pub too_short: usize,
    /// Distinct `(date, gram)` keys counted in the batch.
    pub batch_keys: usize,
    /// Rows removed by pruning after the merge.
    pub pruned: usize,
}

impl AggregateStats {
    /// `false` when the pass left the state untouched.
    pub fn changed(&self) -> bool {
        self.new_rows > 0
    }
}

/// Incremental raw-text to per-day phrase-count transformer.
#[derive(Debug, Clone)]
pub struct CorpusAggregator {
    config: CorpusConfig,
    tokenizer: Tokenizer,
}

impl CorpusAggregator {
    pub fn new(config: CorpusConfig) -> PhrasecastResult<Self> {
        let tokenizer = Tokenizer::new(&config)?;
        Ok(Self { config, tokenizer })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Folds rows newer than `state.checkpoint` into `state.grams`.
    ///
    /// Counts of identical `(date, gram)` keys are summed into the existing
    /// table, then rows at or below the prune threshold are removed. The new
    /// checkpoint is the latest timestamp among the rows just processed. When
    /// no row is newer than the checkpoint the state is returned unchanged.
    ///
    /// In import-all mode the existing table is ignored and rebuilt from
    /// `rows`. The checkpoint is still kept if it is later than every row, so
    /// a rebuild from an older download never moves it backwards.
    #[tracing::instrument(skip_all, fields(rows = rows.len(), import_all = self.config.import_all))]
    pub fn aggregate(&self, rows: &[RawComment], state: CorpusState) -> (CorpusState, AggregateStats) {
        let since = if self.config.import_all {
            None
        } else {
            state.checkpoint
        };
        let fresh: Vec<&RawComment> = rows
            .iter()
            .filter(|r| since.is_none_or(|cp| r.timestamp > cp))
            .collect();

        let Some(latest) = fresh.iter().map(|r| r.timestamp).max() else {
            tracing::info!(checkpoint = ?state.checkpoint, "No new comments since checkpoint");
            return (state, AggregateStats::default());
        };
        let checkpoint = state.checkpoint.map_or(latest, |previous| previous.max(latest));

        let (batch, mut stats) = self.count(&fresh);
        stats.batch_keys = batch.len();

        let mut grams = if self.config.import_all {
            GramCountTable::new()
        } else {
            state.grams
        };
        let merge = grams.merge_sum(batch);
        stats.pruned = grams.prune(self.config.prune_at_or_below);

        if stats.malformed > 0 {
            tracing::warn!(skipped = stats.malformed, "Skipped malformed comments");
        }
        tracing::info!(
            new_rows = stats.new_rows,
            inserted = merge.inserted,
            summed = merge.collided,
            pruned = stats.pruned,
            total = grams.len(),
            %checkpoint,
            "Aggregated comments"
        );

        let state = CorpusState {
            grams,
            checkpoint: Some(checkpoint),
        };
        (state, stats)
    }

    /// Counts grams per calendar day without merging or pruning.
    pub fn count(&self, rows: &[&RawComment]) -> (GramCountTable, AggregateStats) {
        let mut stats = AggregateStats {
            new_rows: rows.len(),
            ..Default::default()
        };
        let mut counts: BTreeMap<GramKey, u64> = BTreeMap::new();

        for row in rows {
            let words = match self.tokenizer.tokenize(row.text.as_deref()) {
                Tokens::Words(words) => words,
                Tokens::Malformed => {
                    tracing::debug!(timestamp = %row.timestamp, "Malformed comment skipped");
                    stats.malformed += 1;
                    continue;
                }
            };
            let grams = self.tokenizer.grams(&words);
            if grams.is_empty() {
                stats.too_short += 1;
                continue;
            }
            let date = row.date();
            for gram in grams {
                *counts.entry((date, gram)).or_default() += 1;
            }
        }

        (counts.into_iter().collect(), stats)
    }
}
