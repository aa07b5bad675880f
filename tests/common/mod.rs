#![allow(dead_code)]

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use phrasecast::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; `RUST_LOG=phrasecast=debug` shows pipeline events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const SYMBOLS: [&str; 2] = ["SCHB", "GC=F"];

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 10, day).expect("valid date")
}

pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    date(day).and_hms_opt(hour, 0, 0).expect("valid timestamp")
}

pub fn symbol(s: &str) -> Symbol {
    s.parse().expect("valid symbol")
}

pub fn config(root: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_storage_root(root)
        .with_vectorizer(VectorizerKind::Hashed { width: 1_000 })
        .with_symbols(SYMBOLS)
}

/// Comments of one day. Every phrase repeats so it survives pruning.
pub fn comments_for(day: u32) -> Vec<RawComment> {
    let mut rows = Vec::new();
    let gold = (day % 3 + 2) as usize;
    for i in 0..gold {
        rows.push(RawComment::new(ts(day, 8 + i as u32), "<b>Gold</b> rally continues &amp; silver follows"));
    }
    if day % 2 == 0 {
        rows.push(RawComment::new(ts(day, 14), "market crash fear everywhere"));
        rows.push(RawComment::new(ts(day, 15), "market crash fear everywhere!"));
    }
    rows.push(RawComment::new(ts(day, 20), "<null>"));
    rows
}

/// Quotes of one day for the tracked symbols plus one untracked symbol.
pub fn prices_for(day: u32) -> Vec<RawPrice> {
    let d = day as f64;
    vec![
        RawPrice::new(ts(day, 16), "SCHB", 45.0 + d, (day % 3) as f64 - 1.0),
        RawPrice::new(ts(day, 16), "GC=F", 1650.0 + d, if day % 2 == 0 { 0.8 } else { -0.4 }),
        RawPrice::new(ts(day, 16), "TSLA", 200.0, 5.0),
    ]
}
