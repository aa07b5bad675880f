use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame, DataType, Field, PlSmallStr, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    error::PhrasecastResult,
    store::{
        MergePolicy, MergeStats, SeriesTable,
        frame::{FrameCodec, date_column, polars_err, read_dates, read_strings, read_u64},
    },
};

/// Composite key of a gram count: calendar day and normalized phrase.
pub type GramKey = (NaiveDate, String);

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
pub enum GramCol {
    /// Calendar day the comments were posted.
    Date,
    /// Space-joined phrase of 2 to 4 tokens.
    Gram,
    /// Number of occurrences of the phrase on that day.
    Count,
}

impl From<GramCol> for PlSmallStr {
    fn from(value: GramCol) -> Self {
        value.as_str().into()
    }
}

impl GramCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Per-day phrase frequencies. At most one row per `(date, gram)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GramCountTable {
    rows: SeriesTable<GramKey, u64>,
}

impl GramCountTable {
    pub const MERGE_POLICY: MergePolicy = MergePolicy::Sum;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: NaiveDate, gram: &str) -> Option<u64> {
        self.rows.get(&(date, gram.to_string())).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GramKey, u64)> {
        self.rows.iter().map(|(k, v)| (k, *v))
    }

    /// Distinct dates, ascending.
    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.keys().map(|(d, _)| *d).collect()
    }

    /// Rows of one day, in gram order.
    pub fn day(&self, date: NaiveDate) -> impl Iterator<Item = (&str, u64)> {
        self.rows
            .as_map()
            .range((date, String::new())..)
            .take_while(move |((d, _), _)| *d == date)
            .map(|((_, gram), count)| (gram.as_str(), *count))
    }

    /// Rows grouped per day, ascending by date then gram.
    pub fn by_day(&self) -> BTreeMap<NaiveDate, Vec<(&str, u64)>> {
        let mut days: BTreeMap<NaiveDate, Vec<(&str, u64)>> = BTreeMap::new();
        for ((date, gram), count) in self.rows.iter() {
            days.entry(*date).or_default().push((gram.as_str(), *count));
        }
        days
    }

    /// Every distinct gram in the table, sorted.
    pub fn vocabulary(&self) -> BTreeSet<&str> {
        self.rows.keys().map(|(_, g)| g.as_str()).collect()
    }

    /// Sums `batch` into this table.
    pub fn merge_sum(&mut self, batch: GramCountTable) -> MergeStats {
        self.rows.merge_sum(batch.rows)
    }

    /// Removes rows with `count <= at_or_below`. Returns the number removed.
    pub fn prune(&mut self, at_or_below: u64) -> usize {
        self.rows.retain(|_, count| *count > at_or_below)
    }
}

impl FromIterator<(GramKey, u64)> for GramCountTable {
    /// Collects counts, summing repeated keys.
    fn from_iter<I: IntoIterator<Item = (GramKey, u64)>>(iter: I) -> Self {
        let mut rows = SeriesTable::new();
        rows.merge_sum(iter);
        Self { rows }
    }
}

impl FrameCodec for GramCountTable {
    const TABLE: &'static str = "grams";

    fn to_schema() -> SchemaRef {
        let fields: Vec<Field> = GramCol::iter()
            .map(|col| {
                let dtype = match col {
                    GramCol::Date => DataType::Date,
                    GramCol::Gram => DataType::String,
                    GramCol::Count => DataType::UInt64,
                };
                Field::new(col.into(), dtype)
            })
            .collect();

        Arc::new(Schema::from_iter(fields))
    }

    fn to_frame(&self) -> PhrasecastResult<DataFrame> {
        let n = self.rows.len();
        let mut dates = Vec::with_capacity(n);
        let mut grams = Vec::with_capacity(n);
        let mut counts = Vec::with_capacity(n);
        for ((date, gram), count) in self.rows.iter() {
            dates.push(*date);
            grams.push(gram.as_str());
            counts.push(*count);
        }

        DataFrame::new(vec![
            date_column(GramCol::Date.as_str(), &dates)?,
            Column::new(GramCol::Gram.name(), grams),
            Column::new(GramCol::Count.name(), counts),
        ])
        .map_err(|e| polars_err("Failed to build grams frame", e))
    }

    fn from_frame(df: &DataFrame) -> PhrasecastResult<Self> {
        let dates = read_dates(df, Self::TABLE, GramCol::Date.as_str())?;
        let grams = read_strings(df, Self::TABLE, GramCol::Gram.as_str())?;
        let counts = read_u64(df, Self::TABLE, GramCol::Count.as_str())?;

        let rows = dates
            .into_iter()
            .zip(grams)
            .zip(counts)
            .map(|((date, gram), count)| ((date, gram), count));
        Ok(Self {
            rows: SeriesTable::from_rows(rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use polars::{df, prelude::SchemaExt};

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 10, d).expect("valid date")
    }

    fn table(rows: &[(u32, &str, u64)]) -> GramCountTable {
        rows.iter()
            .map(|(d, g, c)| ((date(*d), g.to_string()), *c))
            .collect()
    }

    #[test]
    fn merge_sums_shared_keys_and_prune_drops_singletons() {
        let mut existing = table(&[(10, "quick brown", 2), (10, "brown fox", 1)]);
        existing.merge_sum(table(&[(10, "brown fox", 1), (11, "lazy dog", 1)]));

        assert_eq!(existing.get(date(10), "brown fox"), Some(2));
        let removed = existing.prune(1);

        assert_eq!(removed, 1);
        assert_eq!(existing.get(date(11), "lazy dog"), None);
        assert_eq!(existing.get(date(10), "quick brown"), Some(2));
    }

    #[test]
    fn day_returns_only_that_date() {
        let t = table(&[
            (10, "a b", 2),
            (11, "a b", 3),
            (11, "c d", 4),
            (12, "a b", 5),
        ]);

        let day: Vec<_> = t.day(date(11)).collect();
        assert_eq!(day, vec![("a b", 3), ("c d", 4)]);
        assert_eq!(t.dates().len(), 3);
        assert_eq!(t.vocabulary().len(), 2);
    }

    #[test]
    fn frame_round_trip_preserves_rows_and_schema() {
        let t = table(&[(10, "quick brown", 2), (11, "brown fox jumps", 3)]);
        let df = t.to_frame().expect("to frame");

        let schema = GramCountTable::to_schema();
        for field in schema.iter_fields() {
            assert_eq!(
                df.column(field.name()).expect("column").dtype(),
                field.dtype(),
                "dtype of {}",
                field.name()
            );
        }
        assert_eq!(GramCountTable::from_frame(&df).expect("from frame"), t);
    }

    #[test]
    fn from_frame_accepts_other_integer_widths() {
        let df = DataFrame::new(vec![
            date_column("date", &[date(10)]).expect("date column"),
            Column::new("gram".into(), ["quick brown"]),
            Column::new("count".into(), [2i64]),
        ])
        .expect("frame");

        let t = GramCountTable::from_frame(&df).expect("from frame");
        assert_eq!(t.get(date(10), "quick brown"), Some(2));
    }

    #[test]
    fn from_frame_rejects_missing_column() {
        let df = df!["gram" => &["quick brown"]].expect("frame");
        assert!(GramCountTable::from_frame(&df).is_err());
    }
}
