use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    align::{Aligner, TrainingSet},
    data::{
        domain::Symbol,
        prediction_record::{PredictionRow, PredictionTable},
    },
    error::{PhrasecastResult, SystemError},
    features::FeatureTable,
    model::Regressor,
};

/// Fits regression models and produces causal out-of-sample predictions.
#[derive(Debug, Clone)]
pub struct WalkForwardTrainer<R> {
    regressor: R,
    aligner: Aligner,
    show_progress: bool,
}

impl<R: Regressor> WalkForwardTrainer<R> {
    pub fn new(regressor: R, aligner: Aligner) -> Self {
        Self {
            regressor,
            aligner,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    /// Fits one model on every row of `set`.
    #[tracing::instrument(skip_all, fields(rows = set.len()))]
    pub fn train_once(&self, set: &TrainingSet) -> PhrasecastResult<R::Model> {
        let model = self
            .regressor
            .fit(set.features(), set.width(), set.outcomes())?;
        tracing::info!(rows = set.len(), outputs = set.symbols().len(), "Trained production model");
        Ok(model)
    }

    /// Walk-forward backtest.
    ///
    /// For every outcome date `D` of `set`, ascending, a model is fitted on the
    /// rows dated strictly before `D` and applied to the feature vector paired
    /// with `D`. The first date is predicted by a model fitted on no rows.
    /// Dates before `from` are not predicted.
    #[tracing::instrument(skip_all, fields(rows = set.len(), from = ?from))]
    pub fn backtest(&self, set: &TrainingSet, from: Option<NaiveDate>) -> PhrasecastResult<PredictionTable> {
        let start = from.map_or(0, |f| set.rows_before(f));
        let steps = set.len() - start;
        let bar = self.show_progress.then(|| progress_bar(steps as u64)).transpose()?;

        let mut predictions = PredictionTable::new();
        for (i, date) in set.dates().iter().enumerate().skip(start) {
            let (history_x, history_y) = set.head(i);
            let model = self.regressor.fit(history_x, set.width(), history_y)?;
            let values = self.regressor.predict(&model, &set.features()[i])?;
            predictions.insert(*date, PredictionRow::from_values(set.symbols(), &values));

            tracing::debug!(%date, history = i, "Backtest step");
            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        tracing::info!(predicted = predictions.len(), "Backtest finished");
        Ok(predictions)
    }

    /// Predicts the day after the most recent feature date.
    ///
    /// Returns `None` when there are no features.
    pub fn forecast(
        &self,
        model: &R::Model,
        features: &FeatureTable,
        symbols: &[Symbol],
    ) -> PhrasecastResult<Option<(NaiveDate, PredictionRow)>> {
        let Some((feature_date, vector)) = features.latest() else {
            return Ok(None);
        };
        let target = self.aligner.target_date(feature_date)?;
        let values = self.regressor.predict(model, vector)?;
        tracing::info!(%feature_date, %target, "Forecast next day");
        Ok(Some((target, PredictionRow::from_values(symbols, &values))))
    }
}

fn progress_bar(capacity: u64) -> PhrasecastResult<ProgressBar> {
    let bar = ProgressBar::new(capacity);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise}) {msg}")
            .map_err(SystemError::ProgressBar)?
            .progress_chars("#>-"),
    );
    bar.set_message("walk-forward");
    Ok(bar)
}
