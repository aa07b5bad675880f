//! CSV downloads produced by the external fetch job.
//!
//! Every column is read as text and parsed here, so one bad cell only
//! disqualifies its own row.

use std::path::Path;

use polars::prelude::{DataFrame, LazyCsvReader, LazyFileListReader, PlPath, StringChunked};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    data::domain::{RawComment, RawPrice, parse_timestamp},
    error::{DataError, IoError, PhrasecastError, PhrasecastResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommentSourceCol {
    Time,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PriceSourceCol {
    RegularMarketTime,
    Symbol,
    RegularMarketPrice,
    RegularMarketChangePercent,
}

/// Rows parsed from one download and the number of rows that could not be placed in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch<T> {
    pub rows: Vec<T>,
    pub malformed: usize,
}

impl<T> Default for SourceBatch<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            malformed: 0,
        }
    }
}

impl<T> SourceBatch<T> {
    pub fn extend(&mut self, other: SourceBatch<T>) {
        self.rows.extend(other.rows);
        self.malformed += other.malformed;
    }
}

/// Reads a `time,text` comment download.
///
/// Rows without a parseable timestamp are counted as malformed and dropped.
/// Rows with empty text are kept with `text: None`.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_comments(path: &Path) -> PhrasecastResult<SourceBatch<RawComment>> {
    let df = read_as_text(path)?;
    let times = text_column(&df, path, CommentSourceCol::Time.into())?;
    let texts = text_column(&df, path, CommentSourceCol::Text.into())?;

    let mut batch = SourceBatch::default();
    for (time, text) in times.into_iter().zip(texts.into_iter()) {
        match time.map(parse_timestamp) {
            Some(Ok(timestamp)) => batch.rows.push(RawComment {
                timestamp,
                text: text.filter(|t| !t.trim().is_empty()).map(str::to_string),
            }),
            _ => batch.malformed += 1,
        }
    }

    tracing::info!(rows = batch.rows.len(), malformed = batch.malformed, "Read comments");
    Ok(batch)
}

/// Reads several comment downloads in order, e.g. for an import-all rebuild.
pub fn read_comment_files<P: AsRef<Path>>(paths: &[P]) -> PhrasecastResult<SourceBatch<RawComment>> {
    let mut all = SourceBatch::default();
    for path in paths {
        all.extend(read_comments(path.as_ref())?);
    }
    Ok(all)
}

/// Reads a quote download. Unparseable numbers are kept as `None` for the ingestor to skip.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn read_prices(path: &Path) -> PhrasecastResult<SourceBatch<RawPrice>> {
    let df = read_as_text(path)?;
    let times = text_column(&df, path, PriceSourceCol::RegularMarketTime.into())?;
    let symbols = text_column(&df, path, PriceSourceCol::Symbol.into())?;
    let prices = text_column(&df, path, PriceSourceCol::RegularMarketPrice.into())?;
    let changes = text_column(&df, path, PriceSourceCol::RegularMarketChangePercent.into())?;

    let mut batch = SourceBatch::default();
    let rows = times
        .into_iter()
        .zip(symbols.into_iter())
        .zip(prices.into_iter())
        .zip(changes.into_iter());
    for (((time, symbol), price), change) in rows {
        let parsed = time.map(parse_timestamp).and_then(Result::ok);
        match (parsed, symbol) {
            (Some(timestamp), Some(symbol)) => batch.rows.push(RawPrice {
                timestamp,
                symbol: symbol.to_string(),
                price: parse_number(price),
                change_percent: parse_number(change),
            }),
            _ => batch.malformed += 1,
        }
    }

    tracing::info!(rows = batch.rows.len(), malformed = batch.malformed, "Read prices");
    Ok(batch)
}

fn parse_number(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|s| s.trim().parse().ok())
}

fn unreadable(path: &Path, reason: impl ToString) -> PhrasecastError {
    IoError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

fn read_as_text(path: &Path) -> PhrasecastResult<DataFrame> {
    if !path.is_file() {
        return Err(unreadable(path, "file not found"));
    }
    let location = path
        .to_str()
        .ok_or_else(|| unreadable(path, "path is not valid UTF-8"))?;

    LazyCsvReader::new(PlPath::new(location))
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| unreadable(path, e))
}

fn text_column<'a>(df: &'a DataFrame, path: &Path, name: &'static str) -> PhrasecastResult<&'a StringChunked> {
    let column = df.column(name).map_err(|_| DataError::MissingColumn {
        table: path.display().to_string(),
        column: name.to_string(),
    })?;
    column.str().map_err(|e| unreadable(path, e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn comments_keep_empty_text_and_drop_bad_timestamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("comments.csv");
        fs::write(
            &path,
            "time,text\n\
             2022-10-10T08:00:00,\"the quick, brown fox\"\n\
             2022-10-10T09:00:00,\n\
             not a time,lost row\n",
        )
        .expect("write csv");

        let batch = read_comments(&path).expect("read");
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].text.as_deref(), Some("the quick, brown fox"));
        assert_eq!(batch.rows[1].text, None);
    }

    #[test]
    fn prices_keep_unparseable_numbers_as_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prices.csv");
        fs::write(
            &path,
            "regular_market_time,symbol,regular_market_price,regular_market_change_percent\n\
             2022-10-11 16:00:00,SCHB,45.2,0.51\n\
             2022-10-11 16:00:00,GC=F,n/a,-0.2\n",
        )
        .expect("write csv");

        let batch = read_prices(&path).expect("read");
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].change_percent, Some(0.51));
        assert_eq!(batch.rows[1].price, None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_comments(&dir.path().join("absent.csv")).expect_err("missing");
        assert!(matches!(
            err,
            PhrasecastError::Io(IoError::SourceUnreadable { .. })
        ));
    }
}
