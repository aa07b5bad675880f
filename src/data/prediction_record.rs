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
pub enum PredictionCol {
    /// Date the forecast applies to.
    Date,
    /// Ticker symbol.
    Symbol,
    /// Forecast percent change.
    PredictedChangePercent,
}

impl From<PredictionCol> for PlSmallStr {
    fn from(value: PredictionCol) -> Self {
        value.as_str().into()
    }
}

impl PredictionCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Forecast percent change per symbol for one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow(pub BTreeMap<Symbol, f64>);

impl PredictionRow {
    pub fn from_values(symbols: &[Symbol], values: &[f64]) -> Self {
        Self(symbols.iter().cloned().zip(values.iter().copied()).collect())
    }

    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        self.0.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.0.iter().map(|(s, v)| (s, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Predictions keyed by date. A date appears at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionTable {
    rows: SeriesTable<NaiveDate, PredictionRow>,
}

impl PredictionTable {
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

    pub fn get(&self, date: NaiveDate) -> Option<&PredictionRow> {
        self.rows.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &PredictionRow)> {
        self.rows.iter()
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.keys().copied().collect()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|(d, _)| *d)
    }

    pub fn insert(&mut self, date: NaiveDate, row: PredictionRow) {
        self.rows.merge_override_last([(date, row)]);
    }

    pub fn merge_override_last(&mut self, incoming: PredictionTable) -> MergeStats {
        self.rows.merge_override_last(incoming.rows)
    }

    /// Keeps only the rows for which `keep` returns `true`. Returns the number removed.
    pub fn retain(&mut self, keep: impl FnMut(&NaiveDate, &PredictionRow) -> bool) -> usize {
        self.rows.retain(keep)
    }
}

impl FromIterator<(NaiveDate, PredictionRow)> for PredictionTable {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, PredictionRow)>>(iter: I) -> Self {
        Self {
            rows: SeriesTable::from_rows(iter),
        }
    }
}

impl FrameCodec for PredictionTable {
    const TABLE: &'static str = "predictions";

    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = PredictionCol::iter()
            .map(|col| {
                let dtype = match col {
                    PredictionCol::Date => DataType::Date,
                    PredictionCol::Symbol => DataType::String,
                    PredictionCol::PredictedChangePercent => DataType::Float64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }

    fn to_frame(&self) -> PhrasecastResult<DataFrame> {
        let mut dates = Vec::new();
        let mut symbols = Vec::new();
        let mut values = Vec::new();
        for (date, row) in self.rows.iter() {
            for (symbol, value) in row.iter() {
                dates.push(*date);
                symbols.push(symbol.as_str());
                values.push(value);
            }
        }

        DataFrame::new(vec![
            date_column(PredictionCol::Date.as_str(), &dates)?,
            Column::new(PredictionCol::Symbol.name(), symbols),
            Column::new(PredictionCol::PredictedChangePercent.name(), values),
        ])
        .map_err(|e| polars_err("Failed to build predictions frame", e))
    }

    fn from_frame(df: &DataFrame) -> PhrasecastResult<Self> {
        let dates = read_dates(df, Self::TABLE, PredictionCol::Date.as_str())?;
        let symbols = read_strings(df, Self::TABLE, PredictionCol::Symbol.as_str())?;
        let values = read_f64(df, Self::TABLE, PredictionCol::PredictedChangePercent.as_str())?;

        let mut rows: BTreeMap<NaiveDate, PredictionRow> = BTreeMap::new();
        for ((date, symbol), value) in dates.into_iter().zip(symbols).zip(values) {
            let symbol: Symbol = symbol.parse()?;
            rows.entry(date).or_default().0.insert(symbol, value);
        }
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, m, d).expect("valid date")
    }

    fn row(pairs: &[(&str, f64)]) -> PredictionRow {
        PredictionRow(
            pairs
                .iter()
                .map(|(s, v)| (s.parse().expect("symbol"), *v))
                .collect(),
        )
    }

    #[test]
    fn incoming_row_replaces_whole_date() {
        let mut table: PredictionTable = [
            (date(12, 22), row(&[("SCHB", 0.1), ("GC=F", 0.2)])),
            (date(12, 23), row(&[("SCHB", 0.3)])),
        ]
        .into_iter()
        .collect();
        let incoming: PredictionTable = [(date(12, 23), row(&[("GC=F", -0.5)]))].into_iter().collect();

        table.merge_override_last(incoming);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(date(12, 23)), Some(&row(&[("GC=F", -0.5)])));
        assert_eq!(table.latest_date(), Some(date(12, 23)));
    }

    #[test]
    fn long_frame_round_trip() {
        let table: PredictionTable = [
            (date(12, 22), row(&[("SCHB", 0.1), ("GC=F", 0.2)])),
            (date(12, 27), row(&[("SCHB", -0.4), ("GC=F", 1.2)])),
        ]
        .into_iter()
        .collect();

        let df = table.to_frame().expect("to frame");
        assert_eq!(df.height(), 4);
        assert_eq!(PredictionTable::from_frame(&df).expect("from frame"), table);
    }
}
