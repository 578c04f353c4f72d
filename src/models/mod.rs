//! Forecasting models.
//!
//! [`ModelVariant`] is the closed set of candidate configurations the
//! pipeline compares. Each variant fits into a [`FittedModel`], which carries
//! the variant tag and a reference to the training window it was estimated on.

mod stl_forecaster;
mod traits;

pub mod arima;
pub mod exponential;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Forecast, HourWindow, RegularSeries};
use crate::error::{ForecastError, Result};
use crate::utils::stats::quantile_normal;

use arima::{Arima, ArimaFit};
use exponential::{Ets, EtsFit, HoltWinters, HoltWintersFit};

pub use stl_forecaster::{SeasonalProjection, StlFit, StlForecaster};
pub use traits::{FittedForecaster, Forecaster};

/// A candidate model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ModelVariant {
    HoltWinters(HoltWinters),
    StlEts(StlForecaster<Ets>),
    StlArima(StlForecaster<Arima>),
}

impl ModelVariant {
    /// Holt-Winters with all smoothing parameters estimated.
    pub fn holt_winters() -> Self {
        ModelVariant::HoltWinters(HoltWinters::auto())
    }

    /// Decomposition + ETS with the trend selected by AICc.
    pub fn stl_ets() -> Self {
        ModelVariant::StlEts(StlForecaster::new(Ets::auto()))
    }

    /// Decomposition + ARIMA(p, d, q).
    pub fn stl_arima(p: usize, d: usize, q: usize) -> Self {
        ModelVariant::StlArima(StlForecaster::new(Arima::new(p, d, q)))
    }

    /// The three standard candidates.
    pub fn defaults() -> Vec<Self> {
        vec![Self::holt_winters(), Self::stl_ets(), Self::stl_arima(1, 1, 1)]
    }

    /// Stable identifier used as the key in evaluation results.
    pub fn tag(&self) -> String {
        match self {
            ModelVariant::HoltWinters(_) => "HoltWinters".to_string(),
            ModelVariant::StlEts(_) => "STL+ETS".to_string(),
            ModelVariant::StlArima(m) => format!("STL+ARIMA{}", m.model.order),
        }
    }

    pub fn min_training_len(&self, seasonal_periods: &[usize]) -> usize {
        match self {
            ModelVariant::HoltWinters(m) => m.min_training_len(seasonal_periods),
            ModelVariant::StlEts(m) => m.min_training_len(seasonal_periods),
            ModelVariant::StlArima(m) => m.min_training_len(seasonal_periods),
        }
    }

    /// Estimate the variant on `series`.
    ///
    /// Fit failures carry this variant's tag.
    pub fn fit(&self, series: &RegularSeries, seasonal_periods: &[usize]) -> Result<FittedModel> {
        let tag = self.tag();
        let kind = match self {
            ModelVariant::HoltWinters(m) => m.fit(series, seasonal_periods).map(FittedKind::HoltWinters),
            ModelVariant::StlEts(m) => m.fit(series, seasonal_periods).map(FittedKind::StlEts),
            ModelVariant::StlArima(m) => m.fit(series, seasonal_periods).map(FittedKind::StlArima),
        }
        .map_err(|e| match e {
            ForecastError::ModelFit { reason, .. } => ForecastError::model_fit(&tag, reason),
            other => other,
        })?;

        debug!(variant = %tag, spec = %kind.as_forecaster().name(), n = series.len(), "fitted variant");

        Ok(FittedModel {
            tag,
            training: TrainingWindow::of(series),
            kind,
        })
    }
}

/// Location of the training data a model was fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub len: usize,
    #[serde(with = "interval_secs")]
    pub interval: Duration,
    pub window: HourWindow,
}

impl TrainingWindow {
    fn of(series: &RegularSeries) -> Self {
        Self {
            start: series.start(),
            end: series.end(),
            len: series.len(),
            interval: series.interval(),
            window: series.window(),
        }
    }

    /// The `horizon` session slots after the training window.
    pub fn future_timestamps(&self, horizon: usize) -> Result<Vec<DateTime<Utc>>> {
        let mut out = Vec::with_capacity(horizon);
        let mut current = self.end;
        for _ in 0..horizon {
            current = self.window.next_slot(current, self.interval)?;
            out.push(current);
        }
        Ok(out)
    }
}

mod interval_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::seconds)
    }
}

#[derive(Debug, Clone)]
enum FittedKind {
    HoltWinters(HoltWintersFit),
    StlEts(StlFit<EtsFit>),
    StlArima(StlFit<ArimaFit>),
}

impl FittedKind {
    fn as_forecaster(&self) -> &dyn FittedForecaster {
        match self {
            FittedKind::HoltWinters(f) => f,
            FittedKind::StlEts(f) => f,
            FittedKind::StlArima(f) => f,
        }
    }
}

/// An estimated variant, immutable once built.
#[derive(Debug, Clone)]
pub struct FittedModel {
    tag: String,
    training: TrainingWindow,
    kind: FittedKind,
}

impl FittedModel {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn training(&self) -> &TrainingWindow {
        &self.training
    }

    /// The underlying estimated model.
    pub fn forecaster(&self) -> &dyn FittedForecaster {
        self.kind.as_forecaster()
    }

    /// Estimated specification, e.g. `STL+ETS(A,Ad,N)`.
    pub fn description(&self) -> String {
        self.forecaster().name()
    }

    pub fn num_params(&self) -> usize {
        self.forecaster().num_params()
    }

    pub fn residuals(&self) -> &[f64] {
        self.forecaster().residuals()
    }

    pub fn fitted_values(&self) -> &[f64] {
        self.forecaster().fitted_values()
    }

    fn point_forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        if horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "forecast horizon must be positive".to_string(),
            ));
        }
        let point = self.forecaster().predict(horizon)?;
        if point.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::model_fit(
                &self.tag,
                "forecast contains non-finite values",
            ));
        }
        Ok(point)
    }

    /// Point forecast for the `horizon` slots after the training window.
    pub fn forecast(&self, horizon: usize) -> Result<Forecast> {
        let point = self.point_forecast(horizon)?;
        Forecast::new(self.training.future_timestamps(horizon)?, point)
    }

    /// Point forecast with symmetric normal prediction intervals.
    ///
    /// `level` is the coverage probability, strictly between 0 and 1.
    pub fn forecast_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        if !(level > 0.0 && level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "interval level must be in (0, 1), got {level}"
            )));
        }
        let point = self.point_forecast(horizon)?;
        let z = quantile_normal(0.5 + level / 2.0);
        let model = self.forecaster();

        let (lower, upper): (Vec<f64>, Vec<f64>) = point
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let half = z * model.forecast_variance(i + 1).max(0.0).sqrt();
                (p - half, p + half)
            })
            .unzip();

        Forecast::new(self.training.future_timestamps(horizon)?, point)?
            .with_intervals(lower, upper, level)
    }
}
