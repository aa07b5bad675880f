//! Read-side views for a reporting layer.

use std::{cmp::Reverse, collections::BTreeMap};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::{
    domain::Symbol, gram_count::GramCountTable, prediction_record::PredictionTable,
    price_snapshot::PriceTable,
};

// ================================================================================================
// Top Phrases
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRank {
    pub gram: String,
    pub count: u64,
}

/// The `n` most frequent phrases summed over `from..=to`, ties broken alphabetically.
pub fn top_phrases(grams: &GramCountTable, from: NaiveDate, to: NaiveDate, n: usize) -> Vec<PhraseRank> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for ((date, gram), count) in grams.iter() {
        if (from..=to).contains(date) {
            *totals.entry(gram.as_str()).or_default() += count;
        }
    }
    totals
        .into_iter()
        .sorted_by_key(|(gram, count)| (Reverse(*count), *gram))
        .take(n)
        .map(|(gram, count)| PhraseRank {
            gram: gram.to_string(),
            count,
        })
        .collect()
}

// ================================================================================================
// Reconciliation
// ================================================================================================

/// A prediction next to the realized change, if that day has been quoted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub predicted: f64,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Rows with a realized change.
    pub matched: usize,
    pub pending: usize,
    /// Mean squared error over matched rows.
    pub mse: Option<f64>,
    /// Share of matched rows where prediction and outcome have the same sign,
    /// zero being a sign of its own.
    pub hit_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    pub rows: Vec<ReconciliationRow>,
    pub summary: ReconciliationSummary,
}

/// Joins every predicted `(date, symbol)` with the quoted change of that day.
pub fn reconcile(predictions: &PredictionTable, prices: &PriceTable) -> Reconciliation {
    let rows: Vec<ReconciliationRow> = predictions
        .iter()
        .flat_map(|(date, row)| {
            row.iter().map(move |(symbol, predicted)| ReconciliationRow {
                date: *date,
                symbol: symbol.clone(),
                predicted,
                actual: prices.get(*date, symbol).map(|s| s.change_percent),
            })
        })
        .collect();

    let matched: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| r.actual.map(|a| (r.predicted, a)))
        .collect();
    let summary = if matched.is_empty() {
        ReconciliationSummary {
            pending: rows.len(),
            ..Default::default()
        }
    } else {
        let n = matched.len() as f64;
        let mse = matched.iter().map(|(p, a)| (p - a) * (p - a)).sum::<f64>() / n;
        let hits = matched
            .iter()
            .filter(|(p, a)| p.partial_cmp(&0.0) == a.partial_cmp(&0.0))
            .count();
        ReconciliationSummary {
            matched: matched.len(),
            pending: rows.len() - matched.len(),
            mse: Some(mse),
            hit_rate: Some(hits as f64 / n),
        }
    };

    Reconciliation { rows, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{prediction_record::PredictionRow, price_snapshot::PriceSnapshot};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 10, d).expect("valid date")
    }

    fn sym(s: &str) -> Symbol {
        s.parse().expect("symbol")
    }

    #[test]
    fn top_phrases_sum_over_range_and_break_ties_by_gram() {
        let grams: GramCountTable = [
            ((date(10), "quick brown".to_string()), 2),
            ((date(11), "quick brown".to_string()), 3),
            ((date(11), "brown fox".to_string()), 5),
            ((date(11), "alpha beta".to_string()), 5),
            ((date(12), "lazy dog".to_string()), 9),
        ]
        .into_iter()
        .collect();

        let top = top_phrases(&grams, date(10), date(11), 2);
        assert_eq!(
            top,
            vec![
                PhraseRank { gram: "alpha beta".into(), count: 5 },
                PhraseRank { gram: "brown fox".into(), count: 5 },
            ]
        );
        let day = top_phrases(&grams, date(10), date(10), 10);
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].count, 2);
    }

    #[test]
    fn reconciliation_scores_matched_rows_only() {
        let predictions: PredictionTable = [
            (date(11), PredictionRow::from_values(&[sym("GC=F"), sym("SCHB")], &[0.5, -1.0])),
            (date(12), PredictionRow::from_values(&[sym("GC=F"), sym("SCHB")], &[0.2, 0.3])),
        ]
        .into_iter()
        .collect();
        let mut prices = PriceTable::new();
        prices.merge_override_last([
            ((date(11), sym("GC=F")), PriceSnapshot { price: 1650.0, change_percent: 1.5 }),
            ((date(11), sym("SCHB")), PriceSnapshot { price: 45.0, change_percent: 1.0 }),
        ]);

        let report = reconcile(&predictions, &prices);
        assert_eq!(report.rows.len(), 4);
        assert_eq!(report.summary.matched, 2);
        assert_eq!(report.summary.pending, 2);
        assert_eq!(report.summary.mse, Some(2.5));
        assert_eq!(report.summary.hit_rate, Some(0.5));
        assert_eq!(report.rows[3].actual, None);
    }

    #[test]
    fn zero_forecast_hits_only_an_unchanged_price() {
        let symbols = [sym("GC=F"), sym("SCHB"), sym("TSLA")];
        let predictions: PredictionTable = [(date(11), PredictionRow::from_values(&symbols, &[0.0, 0.0, -0.0]))]
            .into_iter()
            .collect();
        let mut prices = PriceTable::new();
        prices.merge_override_last([
            ((date(11), sym("GC=F")), PriceSnapshot { price: 1650.0, change_percent: 0.8 }),
            ((date(11), sym("SCHB")), PriceSnapshot { price: 45.0, change_percent: 0.0 }),
            ((date(11), sym("TSLA")), PriceSnapshot { price: 220.0, change_percent: -1.2 }),
        ]);

        let report = reconcile(&predictions, &prices);
        assert_eq!(report.summary.matched, 3);
        assert_eq!(report.summary.hit_rate, Some(1.0 / 3.0));
    }
}
