use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    corpus::stopwords::ENGLISH_STOP_WORDS,
    error::{ConfigError, IoError, PhrasecastResult},
};

/// Top-level configuration handed to every component at construction.
///
/// All sections implement `Default` with the values the daily job runs with,
/// so a config file only needs to name what it overrides.
///
/// # Example
/// ```
/// # use phrasecast::config::{PipelineConfig, VectorizerKind};
/// let cfg = PipelineConfig::default()
///     .with_storage_root("/var/lib/phrasecast")
///     .with_vectorizer(VectorizerKind::Hashed { width: 1 << 16 })
///     .with_lag_days(1);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub corpus: CorpusConfig,
    pub prices: PriceConfig,
    pub features: FeatureConfig,
    pub training: TrainingConfig,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> PhrasecastResult<Self> {
        let cfg: Self = serde_json::from_str(s).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> PhrasecastResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            IoError::FileSystem(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks the cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = &self.corpus.gram_sizes;
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(ConfigError::InvalidGramSizes(format!("{sizes:?}")));
        }
        if let VectorizerKind::Hashed { width } = self.features.vectorizer {
            if width == 0 || width > u32::MAX as usize {
                return Err(ConfigError::InvalidFeatureWidth(width));
            }
        }
        if self.training.lag_days < 1 {
            return Err(ConfigError::InvalidLag(self.training.lag_days));
        }
        let f = self.training.test_fraction;
        if !(f > 0.0 && f < 1.0) {
            return Err(ConfigError::InvalidTestFraction(f));
        }
        Ok(())
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage.root = root.into();
        self
    }

    pub fn with_vectorizer(mut self, kind: VectorizerKind) -> Self {
        self.features.vectorizer = kind;
        self
    }

    pub fn with_lag_days(mut self, days: i64) -> Self {
        self.training.lag_days = days;
        self
    }

    pub fn with_import_all(mut self, import_all: bool) -> Self {
        self.corpus.import_all = import_all;
        self
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prices.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_backtest_from(mut self, date: NaiveDate) -> Self {
        self.training.backtest_from = Some(date);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.training.dry_run = dry_run;
        self
    }

    pub fn with_reuse_saved_model(mut self, reuse: bool) -> Self {
        self.training.reuse_saved_model = reuse;
        self
    }
}

// ================================================================================================
// Storage
// ================================================================================================

/// Location of the persisted tables. Every table lives directly under `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

impl StorageConfig {
    pub fn grams_path(&self) -> PathBuf {
        self.root.join("grams.parquet")
    }

    pub fn prices_path(&self) -> PathBuf {
        self.root.join("prices.parquet")
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.root.join("predictions.parquet")
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join("model.postcard")
    }
}

// ================================================================================================
// Corpus
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Phrase lengths (in tokens) generated from every comment.
    pub gram_sizes: Vec<usize>,

    /// Tokens shorter than this are dropped.
    pub min_token_len: usize,

    /// Lowercase tokens dropped before n-gram generation.
    pub stop_words: BTreeSet<String>,

    /// Rows whose merged count is at or below this value are pruned.
    pub prune_at_or_below: u64,

    /// Rebuild the table from every supplied row, ignoring the persisted one.
    /// The checkpoint filters nothing but never moves backwards.
    pub import_all: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            gram_sizes: vec![2, 3, 4],
            min_token_len: 2,
            stop_words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            prune_at_or_below: 1,
            import_all: false,
        }
    }
}

// ================================================================================================
// Prices
// ================================================================================================

pub const DEFAULT_SYMBOLS: [&str; 28] = [
    "SCHK", "SCHB", "SCHX", "SCHG", "SCHV", "SCHD", "SCHM", "SCHA", "SCHH", "SCHY", "SCHC", "SCHF",
    "SCHE", "SCHJ", "SCHI", "SCHZ", "SCHP", "SCHO", "SCHR", "SCHQ", "FNDB", "FNDX", "FNDA", "FNDF",
    "FNDC", "FNDE", "GC=F", "SI=F",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Tracked symbols. An empty list accepts every symbol.
    pub symbols: Vec<String>,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ================================================================================================
// Features
// ================================================================================================

/// Strategy for turning a day's gram counts into a numeric vector.
///
/// | Variant   | Width                      | Earlier vectors stable? | Memory                   |
/// |-----------|----------------------------|-------------------------|--------------------------|
/// | `Hashed`  | fixed at `width`           | yes                     | bounded by `width`       |
/// | `Pivoted` | number of distinct grams   | no, columns may grow    | grows with vocabulary    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum VectorizerKind {
    /// Each gram lands in bucket `hash(gram) mod width`. Collisions are accepted noise.
    Hashed { width: usize },
    /// One column per distinct gram in the whole table, sorted lexicographically.
    Pivoted,
}

impl Default for VectorizerKind {
    fn default() -> Self {
        Self::Hashed { width: 100_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeatureConfig {
    pub vectorizer: VectorizerKind,
}

impl FeatureConfig {
    /// Deterministic hash of this configuration.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let bytes = postcard::to_stdvec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

// ================================================================================================
// Training
// ================================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Days between a feature's source date and the outcome date it predicts.
    pub lag_days: i64,

    /// Standardize feature columns (mean 0, unit variance) before fitting.
    pub standardize: bool,

    pub fit_intercept: bool,

    /// Share of rows held out by [`evaluate`](crate::model::evaluate::evaluate).
    pub test_fraction: f64,

    /// Seed for the evaluation split.
    pub seed: u64,

    /// Load the persisted model instead of refitting when its fingerprint matches.
    pub reuse_saved_model: bool,

    /// First date for which the walk-forward backtest emits predictions.
    pub backtest_from: Option<NaiveDate>,

    pub show_progress: bool,

    /// Compute predictions without persisting the model or the prediction table.
    pub dry_run: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            lag_days: 1,
            standardize: true,
            fit_intercept: true,
            test_fraction: 0.2,
            seed: 42,
            reuse_saved_model: false,
            backtest_from: None,
            show_progress: false,
            dry_run: false,
        }
    }
}

impl TrainingConfig {
    pub fn lag(&self) -> Days {
        Days::new(self.lag_days.max(0) as u64)
    }
}
