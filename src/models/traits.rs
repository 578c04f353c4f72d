//! Traits at the seam between a model variant and its estimation algorithm.

use std::fmt::Debug;

use crate::core::RegularSeries;
use crate::error::Result;

/// Model configuration that can be estimated on a regular series.
///
/// Fitting never mutates the configuration: every call produces a new,
/// immutable fitted value.
pub trait Forecaster: Debug + Send + Sync {
    type Fitted: FittedForecaster;

    /// Estimate the model on `series`. `seasonal_periods` are the declared
    /// cycle lengths in ascending order; non-seasonal models ignore them.
    fn fit(&self, series: &RegularSeries, seasonal_periods: &[usize]) -> Result<Self::Fitted>;

    /// Fewest observations the model can be estimated on.
    fn min_training_len(&self, seasonal_periods: &[usize]) -> usize;
}

/// An estimated model.
///
/// Fitted values and residuals cover the tail of the training window: the
/// last `residuals().len()` observations. Initialization periods without a
/// genuine one-step-ahead prediction are excluded.
pub trait FittedForecaster: Debug + Send + Sync {
    /// Point predictions for the `horizon` steps after the training window.
    fn predict(&self, horizon: usize) -> Result<Vec<f64>>;

    fn fitted_values(&self) -> &[f64];

    /// One-step-ahead errors, `actual - fitted`.
    fn residuals(&self) -> &[f64];

    /// Number of estimated parameters, including initial states.
    fn num_params(&self) -> usize;

    /// Descriptive name of the estimated specification, e.g. `ETS(A,Ad,N)`.
    fn name(&self) -> String;

    /// Mean squared one-step error.
    fn residual_variance(&self) -> f64 {
        let r = self.residuals();
        if r.is_empty() {
            return 0.0;
        }
        r.iter().map(|e| e * e).sum::<f64>() / r.len() as f64
    }

    /// Variance of the `h`-step-ahead forecast error.
    fn forecast_variance(&self, h: usize) -> f64 {
        self.residual_variance() * h as f64
    }
}
