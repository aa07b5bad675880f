use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// A ticker symbol as quoted by the price feed (e.g. `SCHB`, `GC=F`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(DataError::InvalidSymbol(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ================================================================================================
// Raw Feed Rows
// ================================================================================================

/// One comment as delivered by the fetch collaborator.
///
/// `text` is `None` when the feed had no usable text for the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub timestamp: NaiveDateTime,
    pub text: Option<String>,
}

impl RawComment {
    pub fn new(timestamp: NaiveDateTime, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: Some(text.into()),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// One price quote as delivered by the fetch collaborator.
///
/// Numeric cells are `None` when they could not be parsed; such rows are skipped on ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrice {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
}

impl RawPrice {
    pub fn new(timestamp: NaiveDateTime, symbol: impl Into<String>, price: f64, change: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            price: Some(price),
            change_percent: Some(change),
        }
    }
}

// ================================================================================================
// Timestamps
// ================================================================================================

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Parses the timestamp shapes the feeds emit.
///
/// Offset-aware inputs are converted to UTC before the offset is dropped.
/// A bare date is read as midnight.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, DataError> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| DataError::TimestampConversion(format!("Unrecognized timestamp '{raw}'")))
}

/// Canonical text form used for the persisted checkpoint.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(h, min, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn parses_feed_timestamp_shapes() {
        let want = ts(2022, 10, 10, 8, 0);
        for raw in [
            "2022-10-10T08:00",
            "2022-10-10 08:00:00",
            "2022-10-10T08:00:00.000",
            "2022-10-10T08:00:00Z",
            "2022-10-10T10:00:00+02:00",
            "2022-10-10 08:00:00 +0000",
        ] {
            assert_eq!(parse_timestamp(raw).expect(raw), want, "input {raw}");
        }
        assert_eq!(parse_timestamp("2022-10-10").expect("date"), ts(2022, 10, 10, 0, 0));
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(matches!(
            parse_timestamp("<null>"),
            Err(DataError::TimestampConversion(_))
        ));
    }

    #[test]
    fn checkpoint_format_round_trips() {
        let t = ts(2022, 10, 11, 23, 59);
        assert_eq!(parse_timestamp(&format_timestamp(&t)).expect("parse"), t);
    }

    #[test]
    fn symbol_rejects_blank() {
        assert!("".parse::<Symbol>().is_err());
        assert!("GC F".parse::<Symbol>().is_err());
        assert_eq!(" GC=F ".parse::<Symbol>().expect("symbol").as_str(), "GC=F");
    }
}
