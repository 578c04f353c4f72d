//! Holdout evaluation of candidate model variants.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::core::RegularSeries;
use crate::error::{ForecastError, Result};
use crate::models::ModelVariant;
use crate::utils::metrics::{accuracy, mase_scale, AccuracyReport};

/// Result of evaluating one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantOutcome {
    Scored(AccuracyReport),
    /// The variant could not be estimated on the training window.
    Failed(ForecastError),
}

impl VariantOutcome {
    pub fn report(&self) -> Option<&AccuracyReport> {
        match self {
            VariantOutcome::Scored(r) => Some(r),
            VariantOutcome::Failed(_) => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, VariantOutcome::Scored(_))
    }
}

/// Outcomes keyed by variant tag, in tag order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CVReport {
    outcomes: BTreeMap<String, VariantOutcome>,
}

impl CVReport {
    pub fn get(&self, tag: &str) -> Option<&VariantOutcome> {
        self.outcomes.get(tag)
    }

    pub(crate) fn insert(&mut self, tag: impl Into<String>, outcome: VariantOutcome) {
        self.outcomes.insert(tag.into(), outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariantOutcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Accuracy reports of the variants that were scored.
    pub fn scored(&self) -> impl Iterator<Item = &AccuracyReport> {
        self.outcomes.values().filter_map(VariantOutcome::report)
    }

    /// Variants whose fit failed, with the failure.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &ForecastError)> {
        self.outcomes.iter().filter_map(|(k, v)| match v {
            VariantOutcome::Failed(e) => Some((k.as_str(), e)),
            VariantOutcome::Scored(_) => None,
        })
    }
}

/// Rolling-origin evaluator.
///
/// With one fold (the default) the last `holdout` observations are held out,
/// every variant is fitted on the rest and scored on a `holdout`-step forecast.
/// With `folds > 1` the origin moves back by `step` per extra fold and the
/// errors of all folds are pooled into one report per variant.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    holdout: usize,
    folds: usize,
    step: usize,
    seasonal_periods: Vec<usize>,
    parallel: bool,
}

impl CrossValidator {
    pub fn new(holdout: usize) -> Self {
        Self {
            holdout,
            folds: 1,
            step: holdout.max(1),
            seasonal_periods: Vec::new(),
            parallel: true,
        }
    }

    /// Evaluate over `folds` origins spaced `step` observations apart.
    pub fn with_folds(mut self, folds: usize, step: usize) -> Self {
        self.folds = folds;
        self.step = step;
        self
    }

    /// Seasonal periods passed to every fit; the shortest also scales MASE.
    pub fn with_seasonal_periods(mut self, periods: Vec<usize>) -> Self {
        self.seasonal_periods = periods;
        self
    }

    /// Evaluate on the calling thread only.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn holdout(&self) -> usize {
        self.holdout
    }

    /// Training-window end for each fold, oldest first.
    fn origins(&self, len: usize) -> Vec<usize> {
        (0..self.folds)
            .map(|k| len - self.holdout - (self.folds - 1 - k) * self.step)
            .collect()
    }

    fn validate(&self, series: &RegularSeries, variants: &[ModelVariant]) -> Result<()> {
        if self.holdout == 0 {
            return Err(ForecastError::InvalidParameter(
                "holdout length must be positive".to_string(),
            ));
        }
        if self.folds == 0 || (self.folds > 1 && self.step == 0) {
            return Err(ForecastError::InvalidParameter(format!(
                "invalid fold layout: {} folds with step {}",
                self.folds, self.step
            )));
        }
        if variants.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no model variants to evaluate".to_string(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for v in variants {
            let tag = v.tag();
            if !seen.insert(tag.clone()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "duplicate variant tag {tag}"
                )));
            }
        }

        Ok(())
    }

    /// History shortfall of each variant, in input order.
    ///
    /// Errors outright when the holdout windows overrun the series, or when
    /// no variant has enough history to train.
    fn shortfalls(
        &self,
        series: &RegularSeries,
        variants: &[ModelVariant],
    ) -> Result<Vec<Option<ForecastError>>> {
        let len = series.len();
        let reach = self.holdout + (self.folds - 1) * self.step;
        let short: Vec<Option<ForecastError>> = variants
            .iter()
            .map(|v| {
                let required = v.min_training_len(&self.seasonal_periods);
                (reach > len || len - reach < required).then(|| {
                    ForecastError::InsufficientHistory {
                        variant: v.tag(),
                        holdout: self.holdout,
                        len,
                        required,
                    }
                })
            })
            .collect();

        if reach > len || short.iter().all(Option::is_some) {
            if let Some(Some(e)) = short.first() {
                return Err(e.clone());
            }
        }
        Ok(short)
    }

    /// Fit, forecast and score every variant.
    ///
    /// A variant whose fit fails, or whose minimum training length does not
    /// fit before the holdout, is recorded as [`VariantOutcome::Failed`].
    /// Any other error aborts the evaluation, as does a holdout that leaves
    /// no variant enough history.
    pub fn evaluate(&self, series: &RegularSeries, variants: &[ModelVariant]) -> Result<CVReport> {
        self.validate(series, variants)?;
        let shortfalls = self.shortfalls(series, variants)?;

        let values = series.values();
        let origins = self.origins(series.len());
        let jobs: Vec<(usize, usize)> = (0..variants.len())
            .filter(|&v| shortfalls[v].is_none())
            .flat_map(|v| origins.iter().map(move |&o| (v, o)))
            .collect();

        let run = |&(v, origin): &(usize, usize)| -> Result<Vec<f64>> {
            let train = series.slice(0, origin)?;
            let fitted = variants[v].fit(&train, &self.seasonal_periods)?;
            Ok(fitted.forecast(self.holdout)?.point().to_vec())
        };

        let forecasts: Vec<Result<Vec<f64>>> = if self.parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };

        // Scale from the shortest training window, shared by every fold.
        let period = self.seasonal_periods.iter().min().copied().unwrap_or(1);
        let scale = mase_scale(&values[..origins[0]], period);

        let mut actual = Vec::with_capacity(self.holdout * self.folds);
        for &o in &origins {
            actual.extend_from_slice(&values[o..o + self.holdout]);
        }

        let mut report = CVReport::default();
        let mut chunks = forecasts.chunks(self.folds);
        for (v, shortfall) in variants.iter().zip(shortfalls) {
            let tag = v.tag();
            let mut pooled = Vec::with_capacity(actual.len());
            let mut failure = shortfall;
            if failure.is_none() {
                for result in chunks.next().unwrap_or_default() {
                    match result {
                        Ok(points) => pooled.extend_from_slice(points),
                        Err(e) if e.is_model_fit() => {
                            failure = Some(e.clone());
                            break;
                        }
                        Err(e) => return Err(e.clone()),
                    }
                }
            }

            let outcome = match failure {
                Some(e) => {
                    warn!(variant = %tag, error = %e, "variant failed during evaluation");
                    VariantOutcome::Failed(e)
                }
                None => {
                    let scored = accuracy(&tag, &actual, &pooled, scale)?;
                    debug!(variant = %tag, rmse = scored.rmse, mae = scored.mae, "variant scored");
                    VariantOutcome::Scored(scored)
                }
            };
            report.insert(tag, outcome);
        }

        if report.scored().next().is_none() {
            return Err(ForecastError::AllVariantsFailed(
                report.failed().map(|(_, e)| e.to_string()).collect(),
            ));
        }
        Ok(report)
    }
}
