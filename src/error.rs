use std::path::PathBuf;

use indicatif::style::TemplateError;
use thiserror::Error;

pub type PhrasecastResult<T> = Result<T, PhrasecastError>;

#[derive(Debug, Error)]
pub enum PhrasecastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while validating a [`PipelineConfig`](crate::config::PipelineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid n-gram sizes: {0}")]
    InvalidGramSizes(String),

    #[error("Invalid feature width: {0}")]
    InvalidFeatureWidth(usize),

    #[error("Invalid lag: {0} days (must be at least 1)")]
    InvalidLag(i64),

    #[error("Invalid evaluation test fraction: {0} (must be in (0, 1))")]
    InvalidTestFraction(f64),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to encode configuration")]
    Encoding(#[from] postcard::Error),
}

/// Errors related to table contents, frame conversion and parsing.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Missing column '{column}' in {table} table")]
    MissingColumn { table: String, column: String },

    #[error("Null value in column '{column}' of {table} table at row {row}")]
    NullValue {
        table: String,
        column: String,
        row: usize,
    },

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error("Date out of range: {0} days from epoch")]
    DateOutOfRange(i64),

    #[error("Invalid symbol string: '{0}'")]
    InvalidSymbol(String),
}

/// Errors related to file I/O and persisted tables.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Failed to read {table} table at {}: {reason}", path.display())]
    CorruptTable {
        table: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write {table} table at {}: {reason}", path.display())]
    WriteFailed {
        table: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to read source file {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("File system error: {0}")]
    FileSystem(String),
}

/// Errors raised by regression fitting and evaluation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Feature index {index} out of range for width {width}")]
    FeatureOutOfRange { index: usize, width: usize },

    #[error("Non-finite outcome at row {row}, column {column}")]
    NonFiniteOutcome { row: usize, column: usize },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Computation error: {0}")]
    Computation(String),
}

/// Errors related to internal invariants.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("System error: {0}")]
    Generic(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Failed to create progress bar: {0}")]
    ProgressBar(#[from] TemplateError),
}
