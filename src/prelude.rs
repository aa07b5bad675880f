// 1. Traits
pub use crate::features::Vectorizer;
pub use crate::model::Regressor;
pub use crate::store::frame::FrameCodec;

// 2. Pipeline Components
pub use crate::align::{Aligner, TrainingSet};
pub use crate::corpus::{AggregateStats, CorpusAggregator, CorpusState};
pub use crate::features::{FeatureTable, FeatureVectorizer, SparseVector};
pub use crate::model::{Evaluation, LinearModel, LinearRegression, SavedModel};
pub use crate::pipeline::{Pipeline, RunSummary};
pub use crate::prices::PriceIngestor;
pub use crate::trainer::WalkForwardTrainer;

// 3. Domain Types & Tables
pub use crate::data::domain::{RawComment, RawPrice, Symbol};
pub use crate::data::gram_count::GramCountTable;
pub use crate::data::prediction_record::{PredictionRow, PredictionTable};
pub use crate::data::price_snapshot::{OutcomeSeries, PriceSnapshot, PriceTable};
pub use crate::store::{MergePolicy, SeriesTable};

// 4. Configuration
pub use crate::config::{
    CorpusConfig, FeatureConfig, PipelineConfig, PriceConfig, StorageConfig, TrainingConfig,
    VectorizerKind,
};

// 5. Errors
pub use crate::error::{
    ConfigError, DataError, IoError, ModelError, PhrasecastError, PhrasecastResult, SystemError,
};
