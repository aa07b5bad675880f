use std::collections::BTreeSet;

use crate::{
    config::PriceConfig,
    data::{
        domain::{RawPrice, Symbol},
        price_snapshot::{PriceSnapshot, PriceTable},
    },
    store::MergeStats,
};

/// Counters describing one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    /// Rows with an invalid symbol or a missing or non-finite number.
    pub malformed: usize,
    /// Rows for symbols that are not tracked.
    pub untracked: usize,
    pub merge: MergeStats,
}

/// Merges fetched daily quotes into the price table, latest quote per `(date, symbol)` winning.
#[derive(Debug, Clone, Default)]
pub struct PriceIngestor {
    tracked: BTreeSet<String>,
}

impl PriceIngestor {
    pub fn new(config: &PriceConfig) -> Self {
        Self {
            tracked: config.symbols.iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    /// An empty tracked list accepts every symbol.
    pub fn is_tracked(&self, symbol: &Symbol) -> bool {
        self.tracked.is_empty() || self.tracked.contains(symbol.as_str())
    }

    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn ingest(&self, rows: &[RawPrice], mut table: PriceTable) -> (PriceTable, IngestStats) {
        let mut stats = IngestStats::default();
        let mut batch = Vec::with_capacity(rows.len());

        for row in rows {
            let Some((symbol, snapshot)) = parse_row(row) else {
                tracing::debug!(timestamp = %row.timestamp, symbol = %row.symbol, "Malformed price skipped");
                stats.malformed += 1;
                continue;
            };
            if !self.is_tracked(&symbol) {
                stats.untracked += 1;
                continue;
            }
            stats.accepted += 1;
            batch.push(((row.timestamp.date(), symbol), snapshot));
        }

        stats.merge = table.merge_override_last(batch);
        if stats.malformed > 0 {
            tracing::warn!(skipped = stats.malformed, "Skipped malformed price rows");
        }
        tracing::info!(
            accepted = stats.accepted,
            untracked = stats.untracked,
            inserted = stats.merge.inserted,
            replaced = stats.merge.collided,
            total = table.len(),
            "Ingested prices"
        );
        (table, stats)
    }
}

fn parse_row(row: &RawPrice) -> Option<(Symbol, PriceSnapshot)> {
    let symbol = row.symbol.parse().ok()?;
    let price = row.price.filter(|v| v.is_finite())?;
    let change_percent = row.change_percent.filter(|v| v.is_finite())?;
    Some((
        symbol,
        PriceSnapshot {
            price,
            change_percent,
        },
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 10, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    fn sym(s: &str) -> Symbol {
        s.parse().expect("symbol")
    }

    #[test]
    fn latest_quote_of_the_day_wins() {
        let ingestor = PriceIngestor::new(&PriceConfig { symbols: vec![] });
        let rows = vec![
            RawPrice::new(ts(11, 15), "SCHB", 50.0, 0.5),
            RawPrice::new(ts(11, 20), "SCHB", 50.5, 1.5),
        ];
        let (table, stats) = ingestor.ingest(&rows, PriceTable::new());

        assert_eq!(stats.accepted, 2);
        assert_eq!(table.len(), 1);
        let d = ts(11, 0).date();
        assert_eq!(table.get(d, &sym("SCHB")).map(|s| s.change_percent), Some(1.5));
    }

    #[test]
    fn reingesting_replaces_existing_rows() {
        let ingestor = PriceIngestor::default();
        let (table, _) = ingestor.ingest(&[RawPrice::new(ts(11, 15), "GC=F", 1650.0, -0.2)], PriceTable::new());
        let (table, stats) = ingestor.ingest(&[RawPrice::new(ts(11, 21), "GC=F", 1655.0, 0.1)], table);

        assert_eq!(stats.merge.collided, 1);
        assert_eq!(table.get(ts(11, 0).date(), &sym("GC=F")).map(|s| s.price), Some(1655.0));
    }

    #[test]
    fn malformed_and_untracked_rows_are_skipped() {
        let ingestor = PriceIngestor::new(&PriceConfig {
            symbols: vec!["SCHB".into()],
        });
        let rows = vec![
            RawPrice {
                timestamp: ts(11, 15),
                symbol: "SCHB".into(),
                price: Some(50.0),
                change_percent: None,
            },
            RawPrice::new(ts(11, 15), "SCHB", 50.0, f64::NAN),
            RawPrice::new(ts(11, 15), " ", 50.0, 0.1),
            RawPrice::new(ts(11, 15), "TSLA", 200.0, 3.0),
            RawPrice::new(ts(12, 15), "SCHB", 51.0, 2.0),
        ];
        let (table, stats) = ingestor.ingest(&rows, PriceTable::new());

        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.untracked, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.latest_date(), Some(ts(12, 0).date()));
    }
}
