//! Seasonal decomposition of regular series.
//!
//! - Classical: centered moving-average trend with phase-averaged seasonals
//! - STL: Seasonal-Trend decomposition using LOESS
//! - MSTL: STL refined over several nested periods
//!
//! [`SeasonalDecomposer`] validates the declared periods and maps the chosen
//! method onto a [`DecompositionResult`] whose components share the input's
//! session grid.

mod classical;
mod mstl;
mod stl;

pub use classical::{classical_decompose, ClassicalResult};
pub use mstl::{MSTLResult, MSTL};
pub use stl::{STLResult, STL};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::RegularSeries;
use crate::error::{ForecastError, Result};
use crate::utils::stats::variance;

/// Nested cycles beyond intraday and intraweek are not modelled.
pub const MAX_SEASONAL_PERIODS: usize = 2;

/// Decomposition algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMethod {
    /// Classical for a single period, loess for several.
    #[default]
    Auto,
    Classical,
    Loess,
}

impl DecompositionMethod {
    fn resolve(self, periods: usize) -> Self {
        match self {
            DecompositionMethod::Auto if periods == 1 => DecompositionMethod::Classical,
            DecompositionMethod::Auto => DecompositionMethod::Loess,
            other => other,
        }
    }
}

/// One seasonal component, addressable by its period.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalComponent {
    pub period: usize,
    pub name: String,
    pub series: RegularSeries,
}

/// Additive decomposition of a regular series.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionResult {
    pub trend: RegularSeries,
    /// Seasonal components in ascending period order.
    pub seasonal: Vec<SeasonalComponent>,
    pub remainder: RegularSeries,
    /// The method actually applied (never `Auto`).
    pub method: DecompositionMethod,
}

impl DecompositionResult {
    /// The component for `period`, if it was declared.
    pub fn seasonal_for(&self, period: usize) -> Option<&SeasonalComponent> {
        self.seasonal.iter().find(|c| c.period == period)
    }

    /// The component named `name` (e.g. `seasonal_13`).
    pub fn component(&self, name: &str) -> Option<&SeasonalComponent> {
        self.seasonal.iter().find(|c| c.name == name)
    }

    pub fn periods(&self) -> Vec<usize> {
        self.seasonal.iter().map(|c| c.period).collect()
    }

    /// Sum of all seasonal components.
    pub fn total_seasonal(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.trend.len()];
        for component in &self.seasonal {
            for (t, s) in total.iter_mut().zip(component.series.values()) {
                *t += s;
            }
        }
        total
    }

    /// Trend plus remainder.
    pub fn deseasonalized(&self) -> Vec<f64> {
        self.trend
            .values()
            .iter()
            .zip(self.remainder.values())
            .map(|(t, r)| t + r)
            .collect()
    }

    /// Trend + seasonal + remainder at every index.
    pub fn reconstruct(&self) -> Vec<f64> {
        self.deseasonalized()
            .iter()
            .zip(self.total_seasonal())
            .map(|(d, s)| d + s)
            .collect()
    }

    /// Strength of the seasonal component for `period`, in `[0, 1]`.
    pub fn seasonal_strength(&self, period: usize) -> Option<f64> {
        let component = self.seasonal_for(period)?;
        Some(strength(component.series.values(), self.remainder.values()))
    }

    /// Strength of the trend, in `[0, 1]`.
    pub fn trend_strength(&self) -> f64 {
        strength(self.trend.values(), self.remainder.values())
    }
}

/// `max(0, 1 - Var(R) / Var(X + R))`.
fn strength(component: &[f64], remainder: &[f64]) -> f64 {
    let combined: Vec<f64> = component
        .iter()
        .zip(remainder.iter())
        .map(|(c, r)| c + r)
        .collect();
    let var_combined = variance(&combined);
    if var_combined.is_nan() || var_combined < 1e-10 {
        return 0.0;
    }
    (1.0 - variance(remainder) / var_combined).clamp(0.0, 1.0)
}

/// Splits a regular series into trend, per-period seasonals and remainder.
#[derive(Debug, Clone)]
pub struct SeasonalDecomposer {
    periods: Vec<usize>,
    method: DecompositionMethod,
    iterations: usize,
    robust: bool,
}

impl SeasonalDecomposer {
    /// Create a decomposer for strictly increasing periods (at most two, each at least 2).
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        validate_periods(&periods)?;
        Ok(Self {
            periods,
            method: DecompositionMethod::Auto,
            iterations: 2,
            robust: false,
        })
    }

    pub fn with_method(mut self, method: DecompositionMethod) -> Self {
        self.method = method;
        self
    }

    /// Number of refinement passes for multi-period loess decomposition.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn robust(mut self, robust: bool) -> Self {
        self.robust = robust;
        self
    }

    pub fn periods(&self) -> &[usize] {
        &self.periods
    }

    /// Decompose `series`.
    ///
    /// Fails with [`ForecastError::PeriodExceedsSeries`] naming the first
    /// declared period that is not shorter than the series.
    pub fn decompose(&self, series: &RegularSeries) -> Result<DecompositionResult> {
        let len = series.len();
        if let Some(&period) = self.periods.iter().find(|&&p| p >= len) {
            return Err(ForecastError::PeriodExceedsSeries { period, len });
        }

        let method = self.method.resolve(self.periods.len());
        let (trend, seasonals, remainder) = match method {
            DecompositionMethod::Classical => self.classical(series.values())?,
            _ => {
                let result = MSTL::new(self.periods.clone())?
                    .with_iterations(self.iterations)
                    .robust(self.robust)
                    .decompose(series.values())?;
                (result.trend, result.seasonal_components, result.remainder)
            }
        };

        debug!(
            method = ?method,
            periods = ?self.periods,
            len,
            "decomposed series"
        );

        let seasonal = self
            .periods
            .iter()
            .zip(seasonals)
            .map(|(&period, values)| {
                Ok(SeasonalComponent {
                    period,
                    name: format!("seasonal_{period}"),
                    series: series.with_values(values)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DecompositionResult {
            trend: series.with_values(trend)?,
            seasonal,
            remainder: series.with_values(remainder)?,
            method,
        })
    }

    /// One classical pass per period in ascending order, each on what the
    /// previous pass left after removing its seasonal.
    fn classical(&self, values: &[f64]) -> Result<(Vec<f64>, Vec<Vec<f64>>, Vec<f64>)> {
        let mut current = values.to_vec();
        let mut seasonals = Vec::with_capacity(self.periods.len());
        let mut trend = Vec::new();
        for &period in &self.periods {
            let pass = classical_decompose(&current, period)?;
            for (c, s) in current.iter_mut().zip(pass.seasonal.iter()) {
                *c -= s;
            }
            seasonals.push(pass.seasonal);
            trend = pass.trend;
        }
        let remainder = current.iter().zip(trend.iter()).map(|(c, t)| c - t).collect();
        Ok((trend, seasonals, remainder))
    }
}

fn validate_periods(periods: &[usize]) -> Result<()> {
    if periods.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "at least one seasonal period is required".to_string(),
        ));
    }
    if periods.len() > MAX_SEASONAL_PERIODS {
        return Err(ForecastError::InvalidParameter(format!(
            "at most {MAX_SEASONAL_PERIODS} seasonal periods are supported, got {}",
            periods.len()
        )));
    }
    if let Some(&p) = periods.iter().find(|&&p| p < 2) {
        return Err(ForecastError::InvalidParameter(format!(
            "seasonal period must be at least 2, got {p}"
        )));
    }
    if periods.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ForecastError::InvalidParameter(format!(
            "seasonal periods must be strictly increasing, got {periods:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HourWindow;
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

    fn visitor_pattern(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let hour = (i % 13) as f64;
                let day = ((i / 13) % 7) as f64;
                let lunch = 8.0 * (-(hour - 3.0).powi(2) / 4.0).exp();
                let weekend = if day >= 5.0 { 6.0 } else { 0.0 };
                10.0 + lunch + weekend + 0.3 * ((i * 7919) % 11) as f64
            })
            .collect()
    }

    #[test]
    fn sawtooth_scenario() {
        let values: Vec<f64> = (0..26).map(|i| 5.0 + (i % 13) as f64).collect();
        let series = business_series(values.clone());
        let result = SeasonalDecomposer::new(vec![13])
            .unwrap()
            .decompose(&series)
            .unwrap();

        assert_eq!(result.method, DecompositionMethod::Classical);
        let seasonal = result.seasonal_for(13).unwrap().series.values();
        for i in 0..13 {
            assert_relative_eq!(seasonal[i], seasonal[i + 13], epsilon = 1e-10);
        }
        for r in result.remainder.values() {
            assert_relative_eq!(*r, 0.0, epsilon = 1e-9);
        }
        assert_eq!(result.trend.timestamps(), series.timestamps());
    }

    #[test]
    fn two_periods_reconstruct_within_tolerance() {
        let series = business_series(visitor_pattern(13 * 7 * 3));
        let result = SeasonalDecomposer::new(vec![13, 91])
            .unwrap()
            .decompose(&series)
            .unwrap();

        assert_eq!(result.method, DecompositionMethod::Loess);
        assert_eq!(result.periods(), vec![13, 91]);
        assert!(result.component("seasonal_91").is_some());
        for (rebuilt, original) in result.reconstruct().iter().zip(series.values()) {
            assert_relative_eq!(*rebuilt, *original, epsilon = 1e-6);
        }
    }

    #[test]
    fn classical_with_two_periods_reconstructs() {
        let series = business_series(visitor_pattern(200));
        let result = SeasonalDecomposer::new(vec![13, 91])
            .unwrap()
            .with_method(DecompositionMethod::Classical)
            .decompose(&series)
            .unwrap();
        for (rebuilt, original) in result.reconstruct().iter().zip(series.values()) {
            assert_relative_eq!(*rebuilt, *original, epsilon = 1e-6);
        }
    }

    #[test]
    fn seasonal_strength_reflects_pattern() {
        let series = business_series(visitor_pattern(13 * 14));
        let result = SeasonalDecomposer::new(vec![13])
            .unwrap()
            .decompose(&series)
            .unwrap();
        assert!(result.seasonal_strength(13).unwrap() > 0.5);
        assert!(result.seasonal_strength(7).is_none());
    }

    #[test]
    fn period_exceeding_series_is_named() {
        let series = business_series(visitor_pattern(60));
        let err = SeasonalDecomposer::new(vec![13, 91])
            .unwrap()
            .decompose(&series)
            .unwrap_err();
        assert_eq!(err, ForecastError::PeriodExceedsSeries { period: 91, len: 60 });
    }

    #[test]
    fn period_validation() {
        assert!(SeasonalDecomposer::new(vec![]).is_err());
        assert!(SeasonalDecomposer::new(vec![1]).is_err());
        assert!(SeasonalDecomposer::new(vec![91, 13]).is_err());
        assert!(SeasonalDecomposer::new(vec![13, 91, 364]).is_err());
        assert!(SeasonalDecomposer::new(vec![13, 91]).is_ok());
    }

    #[test]
    fn constant_series_has_zero_strength() {
        let series = business_series(vec![4.0; 40]);
        let result = SeasonalDecomposer::new(vec![13])
            .unwrap()
            .decompose(&series)
            .unwrap();
        assert_eq!(result.seasonal_strength(13), Some(0.0));
        assert_eq!(result.trend_strength(), 0.0);
    }
}
