use chrono::{Days, NaiveDate};
use ndarray::{Array2, ArrayView1, ArrayView2, s};

use crate::{
    data::{domain::Symbol, price_snapshot::OutcomeSeries},
    error::{PhrasecastResult, SystemError},
    features::{FeatureTable, SparseVector},
};

/// Jointly indexed `(features, outcome)` rows.
///
/// Row `i` pairs the feature vector of `feature_dates[i]` with the outcomes of
/// `dates[i] = feature_dates[i] + lag`. Dates are strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    dates: Vec<NaiveDate>,
    feature_dates: Vec<NaiveDate>,
    features: Vec<SparseVector>,
    outcomes: Array2<f64>,
    symbols: Vec<Symbol>,
    width: usize,
}

impl TrainingSet {
    /// An empty set over the given symbols and width.
    pub fn empty(symbols: Vec<Symbol>, width: usize) -> Self {
        Self {
            dates: Vec::new(),
            feature_dates: Vec::new(),
            features: Vec::new(),
            outcomes: Array2::zeros((0, symbols.len())),
            symbols,
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Outcome dates, ascending.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn feature_dates(&self) -> &[NaiveDate] {
        &self.feature_dates
    }

    pub fn features(&self) -> &[SparseVector] {
        &self.features
    }

    pub fn outcomes(&self) -> ArrayView2<'_, f64> {
        self.outcomes.view()
    }

    pub fn outcome(&self, row: usize) -> ArrayView1<'_, f64> {
        self.outcomes.row(row)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of leading rows whose outcome date is strictly before `date`.
    pub fn rows_before(&self, date: NaiveDate) -> usize {
        self.dates.partition_point(|d| *d < date)
    }

    /// Features and outcomes of the first `n` rows.
    pub fn head(&self, n: usize) -> (&[SparseVector], ArrayView2<'_, f64>) {
        let n = n.min(self.len());
        (&self.features[..n], self.outcomes.slice(s![..n, ..]))
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> (Vec<SparseVector>, Array2<f64>) {
        let features = indices.iter().map(|i| self.features[*i].clone()).collect();
        let outcomes = self.outcomes.select(ndarray::Axis(0), indices);
        (features, outcomes)
    }
}

/// Pairs lagged feature vectors with outcomes.
#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    lag: Days,
}

impl Aligner {
    pub fn new(lag: Days) -> Self {
        Self { lag }
    }

    pub fn lag(&self) -> Days {
        self.lag
    }

    /// The outcome date a feature date predicts.
    pub fn target_date(&self, feature_date: NaiveDate) -> PhrasecastResult<NaiveDate> {
        feature_date.checked_add_days(self.lag).ok_or_else(|| {
            SystemError::InvariantViolation(format!("{feature_date} + {:?} overflows", self.lag)).into()
        })
    }

    /// Shifts every feature date forward by the lag and keeps the dates that
    /// also carry an outcome. No intersection yields an empty set.
    #[tracing::instrument(skip_all, fields(features = features.len(), outcomes = outcomes.rows.len()))]
    pub fn align(&self, features: &FeatureTable, outcomes: &OutcomeSeries) -> PhrasecastResult<TrainingSet> {
        let mut set = TrainingSet::empty(outcomes.symbols.clone(), features.width());
        let mut values = Vec::new();

        for (feature_date, vector) in features.iter() {
            let date = self.target_date(*feature_date)?;
            let Some(outcome) = outcomes.rows.get(&date) else {
                continue;
            };
            set.dates.push(date);
            set.feature_dates.push(*feature_date);
            set.features.push(vector.clone());
            values.extend_from_slice(outcome);
        }

        set.outcomes = Array2::from_shape_vec((set.dates.len(), set.symbols.len()), values)
            .map_err(|e| SystemError::InvariantViolation(format!("outcome matrix shape: {e}")))?;

        tracing::debug!(rows = set.len(), "Aligned features with outcomes");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 10, d).expect("valid date")
    }

    fn features(days: &[u32]) -> FeatureTable {
        let rows: BTreeMap<_, _> = days
            .iter()
            .map(|d| (date(*d), SparseVector::from_pairs([(0, *d as f64)])))
            .collect();
        FeatureTable::new(4, "fp".into(), rows)
    }

    fn outcomes(days: &[u32]) -> OutcomeSeries {
        OutcomeSeries {
            symbols: vec!["SCHB".parse().expect("symbol")],
            rows: days.iter().map(|d| (date(*d), vec![*d as f64 / 10.0])).collect(),
        }
    }

    #[test]
    fn feature_dates_shift_by_one_day_onto_outcome_dates() {
        let set = Aligner::new(Days::new(1))
            .align(&features(&[10, 11]), &outcomes(&[11, 12]))
            .expect("align");

        assert_eq!(set.dates(), &[date(11), date(12)]);
        assert_eq!(set.feature_dates(), &[date(10), date(11)]);
        assert_eq!(set.features()[0].get(0), 10.0);
        assert_eq!(set.outcome(1)[0], 1.2);
    }

    #[test]
    fn only_the_intersection_is_kept() {
        let set = Aligner::new(Days::new(1))
            .align(&features(&[9, 10, 13]), &outcomes(&[11, 12, 14]))
            .expect("align");
        assert_eq!(set.dates(), &[date(11), date(14)]);
        assert_eq!(set.rows_before(date(14)), 1);
    }

    #[test]
    fn disjoint_dates_give_an_empty_set() {
        let set = Aligner::new(Days::new(1))
            .align(&features(&[10]), &outcomes(&[20]))
            .expect("align");
        assert!(set.is_empty());
        assert_eq!(set.outcomes().dim(), (0, 1));
    }
}
