//! One batch run against a storage directory.
//!
//! A run loads every table it touches first, computes the new state in
//! memory and only then persists it, one atomic replace per file. A read or
//! compute failure therefore leaves the storage directory untouched. The
//! corpus checkpoint lives in the footer of the gram table, so the two are
//! always replaced together.

use std::{collections::BTreeSet, time::Instant};

use chrono::NaiveDate;

use crate::{
    align::{Aligner, TrainingSet},
    config::PipelineConfig,
    corpus::{AggregateStats, CorpusAggregator, CorpusState},
    data::{
        domain::{RawComment, RawPrice, format_timestamp, parse_timestamp},
        gram_count::GramCountTable,
        prediction_record::{PredictionRow, PredictionTable},
        price_snapshot::PriceTable,
    },
    error::{IoError, PhrasecastResult},
    features::{FeatureTable, FeatureVectorizer, Vectorizer},
    io,
    model::{Evaluation, LinearModel, LinearRegression, SavedModel, evaluate},
    prediction::{self, PredictionMergeStats},
    prices::{IngestStats, PriceIngestor},
    report::{self, PhraseRank, Reconciliation},
    store::frame::FrameCodec,
    trainer::WalkForwardTrainer,
};

/// Footer key of the gram table holding the corpus checkpoint.
const CHECKPOINT_KEY: &str = "phrasecast.checkpoint";

/// What a daily run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub corpus: AggregateStats,
    pub prices: IngestStats,
    pub training_rows: usize,
    pub model_reused: bool,
    /// Target date and values of the next-day forecast.
    pub forecast: Option<(NaiveDate, PredictionRow)>,
    pub merge: PredictionMergeStats,
    /// The prediction series after the merge, persisted unless dry-run.
    pub predictions: PredictionTable,
}

/// Model inputs derived from the persisted tables.
struct Inputs {
    features: FeatureTable,
    set: TrainingSet,
}

/// Everything a daily run reads, loaded before anything is written.
struct Snapshot {
    corpus: CorpusState,
    prices: PriceTable,
    predictions: PredictionTable,
    saved_model: Option<SavedModel>,
}

enum ModelChoice {
    Reused(LinearModel),
    /// Freshly fitted; persisted at the end of the run unless dry-run.
    Trained(SavedModel),
}

impl ModelChoice {
    fn model(&self) -> &LinearModel {
        match self {
            Self::Reused(model) => model,
            Self::Trained(saved) => &saved.model,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    aggregator: CorpusAggregator,
    ingestor: PriceIngestor,
    vectorizer: FeatureVectorizer,
    trainer: WalkForwardTrainer<LinearRegression>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PhrasecastResult<Self> {
        config.validate()?;
        let aggregator = CorpusAggregator::new(config.corpus.clone())?;
        let ingestor = PriceIngestor::new(&config.prices);
        let vectorizer = FeatureVectorizer::from_config(&config.features)?;
        let training = &config.training;
        let trainer = WalkForwardTrainer::new(
            LinearRegression::new(training.standardize, training.fit_intercept),
            Aligner::new(training.lag()),
        )
        .with_progress(training.show_progress);

        Ok(Self {
            config,
            aggregator,
            ingestor,
            vectorizer,
            trainer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ============================================================================================
    // Stores
    // ============================================================================================

    /// The gram table and the checkpoint stored in its footer.
    pub fn load_corpus(&self) -> PhrasecastResult<CorpusState> {
        let path = self.config.storage.grams_path();
        let Some((grams, metadata)) = io::load_table_with_metadata::<GramCountTable>(&path)? else {
            return Ok(CorpusState::default());
        };
        let checkpoint = metadata
            .get(CHECKPOINT_KEY)
            .map(String::as_str)
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| IoError::CorruptTable {
                table: GramCountTable::TABLE.to_string(),
                path: path.clone(),
                reason: format!("bad checkpoint: {e}"),
            })?;
        Ok(CorpusState { grams, checkpoint })
    }

    pub fn load_grams(&self) -> PhrasecastResult<GramCountTable> {
        Ok(io::load_table(&self.config.storage.grams_path())?.unwrap_or_default())
    }

    pub fn load_prices(&self) -> PhrasecastResult<PriceTable> {
        Ok(io::load_table(&self.config.storage.prices_path())?.unwrap_or_default())
    }

    pub fn load_predictions(&self) -> PhrasecastResult<PredictionTable> {
        Ok(io::load_table(&self.config.storage.predictions_path())?.unwrap_or_default())
    }

    /// The persisted model, read only when reuse is enabled.
    fn load_saved_model(&self) -> PhrasecastResult<Option<SavedModel>> {
        if !self.config.training.reuse_saved_model {
            return Ok(None);
        }
        io::load_postcard(SavedModel::TABLE, &self.config.storage.model_path())
    }

    fn snapshot(&self) -> PhrasecastResult<Snapshot> {
        Ok(Snapshot {
            corpus: self.load_corpus()?,
            prices: self.load_prices()?,
            predictions: self.load_predictions()?,
            saved_model: self.load_saved_model()?,
        })
    }

    fn save_corpus(&self, state: &CorpusState) -> PhrasecastResult<()> {
        let metadata: io::TableMetadata = state
            .checkpoint
            .iter()
            .map(|ts| (CHECKPOINT_KEY.to_string(), format_timestamp(ts)))
            .collect();
        io::save_table_with_metadata(&state.grams, &metadata, &self.config.storage.grams_path())
    }

    // ============================================================================================
    // Stages
    // ============================================================================================

    /// Folds new comments into the persisted gram table.
    #[tracing::instrument(skip_all, fields(rows = comments.len()))]
    pub fn update_corpus(&self, comments: &[RawComment]) -> PhrasecastResult<(CorpusState, AggregateStats)> {
        let (state, stats) = self.aggregator.aggregate(comments, self.load_corpus()?);
        if stats.changed() {
            self.save_corpus(&state)?;
        }
        Ok((state, stats))
    }

    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn update_prices(&self, rows: &[RawPrice]) -> PhrasecastResult<(PriceTable, IngestStats)> {
        let (table, stats) = self.ingestor.ingest(rows, self.load_prices()?);
        if stats.accepted > 0 {
            io::save_table(&table, &self.config.storage.prices_path())?;
        }
        Ok((table, stats))
    }

    fn inputs(&self, grams: &GramCountTable, prices: &PriceTable) -> PhrasecastResult<Inputs> {
        let features = self.vectorizer.vectorize(grams)?;
        let set = Aligner::new(self.config.training.lag()).align(&features, &prices.outcomes())?;
        Ok(Inputs { features, set })
    }

    /// Reuses `saved` when it still fits the features, otherwise fits a new model.
    fn production_model(&self, inputs: &Inputs, saved: Option<SavedModel>) -> PhrasecastResult<ModelChoice> {
        let signature = inputs.features.signature();
        let symbols = inputs.set.symbols();

        if self.config.training.reuse_saved_model {
            match saved {
                Some(saved) if saved.is_compatible(signature, symbols) => {
                    tracing::info!(trained_through = ?saved.trained_through, "Reusing saved model");
                    return Ok(ModelChoice::Reused(saved.model));
                }
                Some(_) => tracing::warn!("Saved model does not match current features, retraining"),
                None => tracing::info!("No saved model, training"),
            }
        }

        Ok(ModelChoice::Trained(SavedModel {
            signature: signature.to_string(),
            symbols: symbols.to_vec(),
            trained_through: inputs.set.dates().last().copied(),
            model: self.trainer.train_once(&inputs.set)?,
        }))
    }

    fn forecast(&self, model: &LinearModel, inputs: &Inputs) -> PhrasecastResult<Option<(NaiveDate, PredictionRow)>> {
        if inputs.set.symbols().is_empty() {
            tracing::warn!("No price history, skipping forecast");
            return Ok(None);
        }
        self.trainer.forecast(model, &inputs.features, inputs.set.symbols())
    }

    /// Persists a newly trained model and the prediction series unless dry-run.
    fn save_outputs(&self, choice: &ModelChoice, predictions: &PredictionTable) -> PhrasecastResult<()> {
        if self.config.training.dry_run {
            return Ok(());
        }
        let storage = &self.config.storage;
        if let ModelChoice::Trained(saved) = choice {
            io::save_postcard(saved, SavedModel::TABLE, &storage.model_path())?;
        }
        io::save_table(predictions, &storage.predictions_path())
    }

    /// The daily job: aggregate comments, ingest prices, fit, forecast the next
    /// day and merge the forecast into the prediction series.
    #[tracing::instrument(skip_all, fields(comments = comments.len(), prices = prices.len(), dry_run = self.config.training.dry_run))]
    pub fn run_daily(&self, comments: &[RawComment], prices: &[RawPrice]) -> PhrasecastResult<RunSummary> {
        let started = Instant::now();
        let snapshot = self.snapshot()?;

        let (corpus, corpus_stats) = self.aggregator.aggregate(comments, snapshot.corpus);
        let (price_table, price_stats) = self.ingestor.ingest(prices, snapshot.prices);
        let inputs = self.inputs(&corpus.grams, &price_table)?;
        let choice = self.production_model(&inputs, snapshot.saved_model)?;
        let forecast = self.forecast(choice.model(), &inputs)?;

        let incoming: PredictionTable = forecast.iter().cloned().collect();
        let (predictions, merge) = prediction::merge(snapshot.predictions, incoming, &price_table.dates());

        if corpus_stats.changed() {
            self.save_corpus(&corpus)?;
        }
        if price_stats.accepted > 0 {
            io::save_table(&price_table, &self.config.storage.prices_path())?;
        }
        self.save_outputs(&choice, &predictions)?;
        tracing::info!(
            elapsed = %humantime::format_duration(started.elapsed()),
            forecast = ?forecast.as_ref().map(|(date, _)| *date),
            "Daily run finished"
        );

        Ok(RunSummary {
            corpus: corpus_stats,
            prices: price_stats,
            training_rows: inputs.set.len(),
            model_reused: matches!(choice, ModelChoice::Reused(_)),
            forecast,
            merge,
            predictions,
        })
    }

    /// Rebuilds the prediction series from a walk-forward backtest plus the
    /// live forecast, replacing whatever was persisted.
    #[tracing::instrument(skip_all, fields(from = ?self.config.training.backtest_from))]
    pub fn rerun_predictions(&self) -> PhrasecastResult<PredictionTable> {
        let started = Instant::now();
        let grams = self.load_grams()?;
        let prices = self.load_prices()?;
        let saved_model = self.load_saved_model()?;
        let inputs = self.inputs(&grams, &prices)?;

        let backtest = self
            .trainer
            .backtest(&inputs.set, self.config.training.backtest_from)?;
        let choice = self.production_model(&inputs, saved_model)?;
        let forecast: PredictionTable = self.forecast(choice.model(), &inputs)?.into_iter().collect();

        let (predictions, _) = prediction::merge(backtest, forecast, &prices.dates());
        self.save_outputs(&choice, &predictions)?;
        tracing::info!(
            elapsed = %humantime::format_duration(started.elapsed()),
            rows = predictions.len(),
            "Predictions rebuilt"
        );
        Ok(predictions)
    }

    /// Hold-out MSE/RMSE of a fit on the persisted tables.
    pub fn evaluate(&self) -> PhrasecastResult<Evaluation> {
        let inputs = self.inputs(&self.load_grams()?, &self.load_prices()?)?;
        let training = &self.config.training;
        evaluate(
            self.trainer.regressor(),
            &inputs.set,
            training.test_fraction,
            training.seed,
        )
    }

    // ============================================================================================
    // Reports
    // ============================================================================================

    pub fn top_phrases(&self, from: NaiveDate, to: NaiveDate, n: usize) -> PhrasecastResult<Vec<PhraseRank>> {
        Ok(report::top_phrases(&self.load_grams()?, from, to, n))
    }

    pub fn reconcile(&self) -> PhrasecastResult<Reconciliation> {
        Ok(report::reconcile(&self.load_predictions()?, &self.load_prices()?))
    }

    /// Distinct price dates, the set pending predictions are checked against.
    pub fn price_dates(&self) -> PhrasecastResult<BTreeSet<NaiveDate>> {
        Ok(self.load_prices()?.dates())
    }
}
