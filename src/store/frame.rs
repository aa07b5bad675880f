use chrono::{NaiveDate, TimeDelta};
use polars::prelude::{Column, DataFrame, DataType, PolarsError, SchemaRef};

use crate::error::{DataError, PhrasecastError, PhrasecastResult};

/// Conversion between an in-memory table and its long-format `DataFrame`.
///
/// Every persisted table implements this; [`crate::io`] only ever sees frames.
pub trait FrameCodec: Sized {
    /// Table name used in logs and error messages.
    const TABLE: &'static str;

    /// Returns the canonical schema of the persisted frame.
    fn to_schema() -> SchemaRef;

    fn to_frame(&self) -> PhrasecastResult<DataFrame>;

    /// Rebuilds the table. Rows are read in frame order, so a repeated key keeps the later row.
    fn from_frame(df: &DataFrame) -> PhrasecastResult<Self>;
}

pub(crate) fn polars_err(context: &str, e: PolarsError) -> PhrasecastError {
    DataError::DataFrame(format!("{context}: {e}")).into()
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub(crate) fn days_from_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub(crate) fn date_from_days(days: i32) -> PhrasecastResult<NaiveDate> {
    TimeDelta::try_days(days as i64)
        .and_then(|delta| epoch().checked_add_signed(delta))
        .ok_or_else(|| DataError::DateOutOfRange(days as i64).into())
}

pub(crate) fn date_column(name: &str, dates: &[NaiveDate]) -> PhrasecastResult<Column> {
    let days: Vec<i32> = dates.iter().map(|d| days_from_epoch(*d)).collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| polars_err("Failed to build date column", e))
}

fn column<'a>(df: &'a DataFrame, table: &str, name: &str) -> PhrasecastResult<&'a Column> {
    df.column(name).map_err(|_| {
        DataError::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        }
        .into()
    })
}

fn null_value(table: &str, name: &str, row: usize) -> PhrasecastError {
    DataError::NullValue {
        table: table.to_string(),
        column: name.to_string(),
        row,
    }
    .into()
}

pub(crate) fn read_dates(df: &DataFrame, table: &str, name: &str) -> PhrasecastResult<Vec<NaiveDate>> {
    let days = column(df, table, name)?
        .cast(&DataType::Int32)
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not a date"), e))?;
    let ca = days
        .i32()
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not a date"), e))?;

    ca.into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| null_value(table, name, row)).and_then(date_from_days))
        .collect()
}

pub(crate) fn read_strings(df: &DataFrame, table: &str, name: &str) -> PhrasecastResult<Vec<String>> {
    let ca = column(df, table, name)?
        .str()
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not a string"), e))?;

    ca.into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string)
                .ok_or_else(|| null_value(table, name, row))
        })
        .collect()
}

pub(crate) fn read_u64(df: &DataFrame, table: &str, name: &str) -> PhrasecastResult<Vec<u64>> {
    let values = column(df, table, name)?
        .cast(&DataType::UInt64)
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not an integer"), e))?;
    let ca = values
        .u64()
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not an integer"), e))?;

    ca.into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| null_value(table, name, row)))
        .collect()
}

pub(crate) fn read_f64(df: &DataFrame, table: &str, name: &str) -> PhrasecastResult<Vec<f64>> {
    let values = column(df, table, name)?
        .cast(&DataType::Float64)
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not numeric"), e))?;
    let ca = values
        .f64()
        .map_err(|e| polars_err(&format!("Column '{name}' of {table} is not numeric"), e))?;

    ca.into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| null_value(table, name, row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    #[test]
    fn date_round_trips_through_epoch_days() {
        let d = NaiveDate::from_ymd_opt(2022, 10, 10).expect("valid date");
        assert_eq!(date_from_days(days_from_epoch(d)).expect("in range"), d);
        assert_eq!(days_from_epoch(epoch()), 0);
    }

    #[test]
    fn date_column_has_date_dtype() {
        let d = NaiveDate::from_ymd_opt(2022, 12, 25).expect("valid date");
        let col = date_column("date", &[d]).expect("date column");
        assert_eq!(col.dtype(), &DataType::Date);

        let df = DataFrame::new(vec![col]).expect("frame");
        assert_eq!(read_dates(&df, "test", "date").expect("dates"), vec![d]);
    }

    #[test]
    fn missing_and_null_cells_are_reported() {
        let df = df![
            "gram" => &[Some("quick brown"), None],
        ]
        .expect("frame");

        let missing = read_u64(&df, "grams", "count");
        assert!(matches!(
            missing,
            Err(PhrasecastError::Data(DataError::MissingColumn { .. }))
        ));

        let null = read_strings(&df, "grams", "gram");
        assert!(matches!(
            null,
            Err(PhrasecastError::Data(DataError::NullValue { row: 1, .. }))
        ));
    }
}
