use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame, DataType, Field, PlSmallStr, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    data::domain::Symbol,
    error::PhrasecastResult,
    store::{
        MergePolicy, MergeStats, SeriesTable,
        frame::{FrameCodec, date_column, polars_err, read_dates, read_f64, read_strings},
    },
};

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
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PriceCol {
    /// Trading day of the quote.
    Date,
    /// Ticker symbol.
    Symbol,
    /// Last market price.
    Price,
    /// Percent change versus the previous close.
    ChangePercent,
}

impl From<PriceCol> for PlSmallStr {
    fn from(value: PriceCol) -> Self {
        value.as_str().into()
    }
}

impl PriceCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub price: f64,
    pub change_percent: f64,
}

/// Daily quotes keyed by `(date, symbol)`. The most recently ingested quote wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    rows: SeriesTable<(NaiveDate, Symbol), PriceSnapshot>,
}

impl PriceTable {
    pub const MERGE_POLICY: MergePolicy = MergePolicy::OverrideLast;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: NaiveDate, symbol: &Symbol) -> Option<&PriceSnapshot> {
        self.rows.get(&(date, symbol.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(NaiveDate, Symbol), &PriceSnapshot)> {
        self.rows.iter()
    }

    /// Distinct trading days, ascending.
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.keys().map(|(d, _)| *d).collect()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|((d, _), _)| *d)
    }

    pub fn merge_override_last<I>(&mut self, incoming: I) -> MergeStats
    where
        I: IntoIterator<Item = ((NaiveDate, Symbol), PriceSnapshot)>,
    {
        self.rows.merge_override_last(incoming)
    }

    /// Change-percent series per date over a fixed symbol universe.
    ///
    /// The universe is the set of symbols quoted on the most recent date. Dates
    /// on which any of those symbols is missing are left out.
    pub fn outcomes(&self) -> OutcomeSeries {
        let Some(latest) = self.latest_date() else {
            return OutcomeSeries::default();
        };
        let symbols: Vec<Symbol> = self
            .rows
            .keys()
            .rev()
            .take_while(|(d, _)| *d == latest)
            .map(|(_, s)| s.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut per_date: BTreeMap<NaiveDate, BTreeMap<&Symbol, f64>> = BTreeMap::new();
        for ((date, symbol), snap) in self.rows.iter() {
            per_date
                .entry(*date)
                .or_default()
                .insert(symbol, snap.change_percent);
        }

        let rows = per_date
            .into_iter()
            .filter_map(|(date, quotes)| {
                symbols
                    .iter()
                    .map(|s| quotes.get(s).copied())
                    .collect::<Option<Vec<f64>>>()
                    .map(|values| (date, values))
            })
            .collect();

        OutcomeSeries { symbols, rows }
    }
}

impl FrameCodec for PriceTable {
    const TABLE: &'static str = "prices";

    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PriceCol::iter()
            .map(|col| {
                let dtype = match col {
                    PriceCol::Date => DataType::Date,
                    PriceCol::Symbol => DataType::String,
                    PriceCol::Price | PriceCol::ChangePercent => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }

    fn to_frame(&self) -> PhrasecastResult<DataFrame> {
        let n = self.rows.len();
        let mut dates = Vec::with_capacity(n);
        let mut symbols = Vec::with_capacity(n);
        let mut prices = Vec::with_capacity(n);
        let mut changes = Vec::with_capacity(n);
        for ((date, symbol), snap) in self.rows.iter() {
            dates.push(*date);
            symbols.push(symbol.as_str());
            prices.push(snap.price);
            changes.push(snap.change_percent);
        }

        DataFrame::new(vec![
            date_column(PriceCol::Date.as_str(), &dates)?,
            Column::new(PriceCol::Symbol.name(), symbols),
            Column::new(PriceCol::Price.name(), prices),
            Column::new(PriceCol::ChangePercent.name(), changes),
        ])
        .map_err(|e| polars_err("Failed to build prices frame", e))
    }

    fn from_frame(df: &DataFrame) -> PhrasecastResult<Self> {
        let dates = read_dates(df, Self::TABLE, PriceCol::Date.as_str())?;
        let symbols = read_strings(df, Self::TABLE, PriceCol::Symbol.as_str())?;
        let prices = read_f64(df, Self::TABLE, PriceCol::Price.as_str())?;
        let changes = read_f64(df, Self::TABLE, PriceCol::ChangePercent.as_str())?;

        let mut rows = Vec::with_capacity(dates.len());
        for (((date, symbol), price), change_percent) in
            dates.into_iter().zip(symbols).zip(prices).zip(changes)
        {
            let symbol: Symbol = symbol.parse()?;
            rows.push((
                (date, symbol),
                PriceSnapshot {
                    price,
                    change_percent,
                },
            ));
        }
        Ok(Self {
            rows: SeriesTable::from_rows(rows),
        })
    }
}

// ================================================================================================
// Outcome Series
// ================================================================================================

/// Dense per-date outcome vectors, one value per symbol in `symbols` order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeSeries {
    pub symbols: Vec<Symbol>,
    pub rows: BTreeMap<NaiveDate, Vec<f64>>,
}

impl OutcomeSeries {
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 10, d).expect("valid date")
    }

    fn sym(s: &str) -> Symbol {
        s.parse().expect("symbol")
    }

    fn quote(d: u32, s: &str, change: f64) -> ((NaiveDate, Symbol), PriceSnapshot) {
        (
            (date(d), sym(s)),
            PriceSnapshot {
                price: 100.0 + change,
                change_percent: change,
            },
        )
    }

    #[test]
    fn later_quote_overrides_earlier_one() {
        let mut table = PriceTable::new();
        table.merge_override_last([quote(10, "SCHB", 0.5)]);
        let stats = table.merge_override_last([quote(10, "SCHB", -0.25), quote(11, "SCHB", 1.0)]);

        assert_eq!(stats.collided, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(date(10), &sym("SCHB")).map(|s| s.change_percent),
            Some(-0.25)
        );
        assert_eq!(table.latest_date(), Some(date(11)));
    }

    #[test]
    fn outcomes_use_latest_symbols_and_skip_incomplete_dates() {
        let mut table = PriceTable::new();
        table.merge_override_last([
            quote(10, "SCHB", 0.1),
            quote(11, "SCHB", 0.2),
            quote(11, "GC=F", -0.3),
            quote(11, "OLD", 9.0),
            quote(12, "SCHB", 0.4),
            quote(12, "GC=F", 0.5),
        ]);

        let outcomes = table.outcomes();
        assert_eq!(outcomes.symbols, vec![sym("GC=F"), sym("SCHB")]);
        assert_eq!(outcomes.dates().into_iter().collect::<Vec<_>>(), vec![date(11), date(12)]);
        assert_eq!(outcomes.rows[&date(11)], vec![-0.3, 0.2]);
    }

    #[test]
    fn empty_table_has_no_outcomes() {
        assert!(PriceTable::new().outcomes().is_empty());
    }

    #[test]
    fn frame_round_trip() {
        let mut table = PriceTable::new();
        table.merge_override_last([quote(10, "SCHB", 0.1), quote(10, "GC=F", -1.5)]);

        let df = table.to_frame().expect("to frame");
        assert_eq!(df.height(), 2);
        assert_eq!(PriceTable::from_frame(&df).expect("from frame"), table);
    }
}
