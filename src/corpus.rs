//! Incremental conversion of raw comments into per-day phrase counts.

pub mod aggregator;
pub mod stopwords;
pub mod tokenizer;

pub use aggregator::{AggregateStats, CorpusAggregator, CorpusState};
pub use tokenizer::{Tokenizer, Tokens};
