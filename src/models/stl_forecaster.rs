//! Decomposition-based forecasting ("stlm").
//!
//! The series is split into seasonal components and a deseasonalized part
//! (trend + remainder). A non-seasonal model is fitted to the deseasonalized
//! part and its forecast is recombined with the seasonal components projected
//! forward cycle by cycle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::RegularSeries;
use crate::error::Result;
use crate::models::{FittedForecaster, Forecaster};
use crate::seasonality::{DecompositionMethod, SeasonalDecomposer};

/// How seasonal components are carried into the forecast horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalProjection {
    /// Repeat the last observed full cycle.
    #[default]
    LastCycle,
    /// Repeat the per-phase average over all observed cycles.
    Average,
}

/// Decompose, model the deseasonalized series with `model`, add seasonals back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "M: Deserialize<'de> + Default"))]
pub struct StlForecaster<M> {
    pub model: M,
    pub method: DecompositionMethod,
    pub robust: bool,
    pub projection: SeasonalProjection,
}

impl<M: Default> Default for StlForecaster<M> {
    fn default() -> Self {
        Self::new(M::default())
    }
}

impl<M> StlForecaster<M> {
    /// Loess decomposition with last-cycle projection.
    pub fn new(model: M) -> Self {
        Self {
            model,
            method: DecompositionMethod::Loess,
            robust: false,
            projection: SeasonalProjection::LastCycle,
        }
    }

    pub fn with_method(mut self, method: DecompositionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn robust(mut self, robust: bool) -> Self {
        self.robust = robust;
        self
    }

    pub fn with_projection(mut self, projection: SeasonalProjection) -> Self {
        self.projection = projection;
        self
    }
}

fn project_cycle(values: &[f64], period: usize, projection: SeasonalProjection) -> Vec<f64> {
    let n = values.len();
    match projection {
        SeasonalProjection::LastCycle => {
            // Phase 0 of the returned cycle is the first step after the series.
            let start = n - period;
            values[start..].to_vec()
        }
        SeasonalProjection::Average => {
            let mut sums = vec![0.0; period];
            let mut counts = vec![0usize; period];
            for (i, v) in values.iter().enumerate() {
                // Phase relative to the first forecast step.
                let phase = (i + period - n % period) % period;
                sums[phase] += v;
                counts[phase] += 1;
            }
            sums.iter()
                .zip(counts.iter())
                .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
                .collect()
        }
    }
}

impl<M: Forecaster> Forecaster for StlForecaster<M> {
    type Fitted = StlFit<M::Fitted>;

    fn fit(&self, series: &RegularSeries, seasonal_periods: &[usize]) -> Result<Self::Fitted> {
        let decomposition = SeasonalDecomposer::new(seasonal_periods.to_vec())?
            .with_method(self.method)
            .robust(self.robust)
            .decompose(series)?;

        let deseasonalized = series.with_values(decomposition.deseasonalized())?;
        let inner = self.model.fit(&deseasonalized, seasonal_periods)?;

        let cycles: Vec<Vec<f64>> = decomposition
            .seasonal
            .iter()
            .map(|c| project_cycle(c.series.values(), c.period, self.projection))
            .collect();

        let total = decomposition.total_seasonal();
        let offset = series.len() - inner.fitted_values().len();
        let fitted = inner
            .fitted_values()
            .iter()
            .zip(&total[offset..])
            .map(|(f, s)| f + s)
            .collect();
        let residuals = inner.residuals().to_vec();

        debug!(
            inner = %inner.name(),
            periods = ?seasonal_periods,
            "fitted decomposition forecaster"
        );

        Ok(StlFit {
            inner,
            cycles,
            fitted,
            residuals,
        })
    }

    fn min_training_len(&self, seasonal_periods: &[usize]) -> usize {
        let longest = seasonal_periods.iter().max().copied().unwrap_or(1);
        (2 * longest).max(self.model.min_training_len(seasonal_periods))
    }
}

/// Estimated decomposition forecaster.
#[derive(Debug, Clone)]
pub struct StlFit<F> {
    inner: F,
    /// Projected cycle per seasonal component, phase 0 = first forecast step.
    cycles: Vec<Vec<f64>>,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl<F: FittedForecaster> StlFit<F> {
    /// The model fitted to the deseasonalized series.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Seasonal contribution for forecast step `h` (1-based).
    fn seasonal_at(&self, h: usize) -> f64 {
        self.cycles.iter().map(|c| c[(h - 1) % c.len()]).sum()
    }
}

impl<F: FittedForecaster> FittedForecaster for StlFit<F> {
    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let base = self.inner.predict(horizon)?;
        Ok(base
            .iter()
            .enumerate()
            .map(|(i, b)| b + self.seasonal_at(i + 1))
            .collect())
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn num_params(&self) -> usize {
        self.inner.num_params()
    }

    fn name(&self) -> String {
        format!("STL+{}", self.inner.name())
    }

    fn forecast_variance(&self, h: usize) -> f64 {
        self.inner.forecast_variance(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HourWindow;
    use crate::models::exponential::{Ets, TrendType};
    use crate::models::arima::Arima;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn business_series(values: Vec<f64>) -> RegularSeries {
        RegularSeries::from_values(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            Duration::hours(1),
            HourWindow::new(10, 22).unwrap(),
            values,
        )
        .unwrap()
    }

    fn pattern(i: usize) -> f64 {
        [2.0, 4.0, 9.0, 12.0, 10.0, 6.0, 5.0, 5.0, 6.0, 8.0, 7.0, 4.0, 2.0][i % 13]
    }

    #[test]
    fn pure_seasonal_series_repeats_cycle() {
        let values: Vec<f64> = (0..13 * 6).map(|i| 20.0 + pattern(i)).collect();
        let fit = StlForecaster::new(Ets::with_trend(TrendType::None))
            .with_method(DecompositionMethod::Classical)
            .fit(&business_series(values), &[13])
            .unwrap();

        let forecast = fit.predict(13).unwrap();
        for (h, f) in forecast.iter().enumerate() {
            assert_relative_eq!(*f, 20.0 + pattern(13 * 6 + h), epsilon = 1e-6);
        }
        assert_eq!(fit.name(), "STL+ETS(A,N,N)");
    }

    #[test]
    fn loess_with_two_periods() {
        let values: Vec<f64> = (0..13 * 7 * 3)
            .map(|i| 30.0 + pattern(i) + if (i / 13) % 7 >= 5 { 8.0 } else { 0.0 })
            .collect();
        let fit = StlForecaster::new(Arima::default())
            .fit(&business_series(values), &[13, 91])
            .unwrap();
        let forecast = fit.predict(26).unwrap();
        assert_eq!(forecast.len(), 26);
        assert!(forecast.iter().all(|f| f.is_finite()));
        assert_eq!(fit.fitted_values().len(), fit.residuals().len());
    }

    #[test]
    fn average_projection_aligns_phase() {
        // Series length not a multiple of the period.
        let values: Vec<f64> = (0..30).map(|i| (i % 4) as f64).collect();
        let cycle = project_cycle(&values, 4, SeasonalProjection::Average);
        let last = project_cycle(&values, 4, SeasonalProjection::LastCycle);
        // Next step after index 29 has phase 30 % 4 = 2.
        assert_relative_eq!(cycle[0], 2.0);
        assert_relative_eq!(last[0], 2.0);
        assert_eq!(cycle, last);
    }

    #[test]
    fn all_zero_series_fits() {
        let fit = StlForecaster::new(Ets::auto())
            .fit(&business_series(vec![0.0; 13 * 4]), &[13])
            .unwrap();
        for f in fit.predict(5).unwrap() {
            assert_relative_eq!(f, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn min_training_len_covers_two_longest_cycles() {
        let model = StlForecaster::new(Ets::auto());
        assert_eq!(model.min_training_len(&[13, 91]), 182);
    }
}
