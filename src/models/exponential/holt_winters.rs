//! Additive Holt-Winters (triple exponential smoothing).
//!
//! Model equations:
//! - Level: `l_t = α(y_t - s_{t-m}) + (1-α)(l_{t-1} + b_{t-1})`
//! - Trend: `b_t = β(l_t - l_{t-1}) + (1-β)b_{t-1}`
//! - Seasonal: `s_t = γ(y_t - l_t) + (1-γ)s_{t-m}`
//! - Forecast: `ŷ_{t+h} = l_t + h*b_t + s_{t+h-m}`

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::RegularSeries;
use crate::error::{ForecastError, Result};
use crate::models::{FittedForecaster, Forecaster};
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::stats::is_constant;

const NAME: &str = "HoltWinters";
const BOUNDS: [(f64, f64); 3] = [(0.0001, 0.9999); 3];

/// Holt-Winters configuration. Unset smoothing parameters are estimated by
/// minimizing the one-step-ahead sum of squared errors.
///
/// Only one cycle is modelled: the shortest declared seasonal period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoltWinters {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

impl HoltWinters {
    /// Estimate all smoothing parameters.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Fixed smoothing parameters, clamped to the open unit interval.
    pub fn with_params(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha: Some(alpha.clamp(BOUNDS[0].0, BOUNDS[0].1)),
            beta: Some(beta.clamp(BOUNDS[1].0, BOUNDS[1].1)),
            gamma: Some(gamma.clamp(BOUNDS[2].0, BOUNDS[2].1)),
        }
    }

    fn period(seasonal_periods: &[usize]) -> Result<usize> {
        match seasonal_periods.iter().min() {
            Some(&p) if p >= 2 => Ok(p),
            Some(&p) => Err(ForecastError::InvalidParameter(format!(
                "seasonal period must be at least 2, got {p}"
            ))),
            None => Err(ForecastError::InvalidParameter(
                "Holt-Winters needs a seasonal period".to_string(),
            )),
        }
    }
}

/// Smoothing state after running the recursions over a series.
#[derive(Debug, Clone)]
struct State {
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
}

impl State {
    /// Level from the first cycle's mean, trend from the average change
    /// between the first two cycles, seasonals from first-cycle deviations.
    fn initial(values: &[f64], period: usize) -> Self {
        let first = &values[..period];
        let level = first.iter().sum::<f64>() / period as f64;
        let trend = (0..period)
            .map(|i| (values[period + i] - values[i]) / period as f64)
            .sum::<f64>()
            / period as f64;

        let mut seasonals: Vec<f64> = first.iter().map(|y| y - level).collect();
        let offset = seasonals.iter().sum::<f64>() / period as f64;
        for s in &mut seasonals {
            *s -= offset;
        }
        Self {
            level,
            trend,
            seasonals,
        }
    }

    /// One-step prediction for index `t`, then update with the observation.
    fn step(&mut self, t: usize, y: f64, alpha: f64, beta: f64, gamma: f64) -> f64 {
        let idx = t % self.seasonals.len();
        let s = self.seasonals[idx];
        let prediction = self.level + self.trend + s;

        let previous = self.level;
        self.level = alpha * (y - s) + (1.0 - alpha) * (previous + self.trend);
        self.trend = beta * (self.level - previous) + (1.0 - beta) * self.trend;
        self.seasonals[idx] = gamma * (y - self.level) + (1.0 - gamma) * s;
        prediction
    }
}

fn sse(values: &[f64], period: usize, alpha: f64, beta: f64, gamma: f64) -> f64 {
    let mut state = State::initial(values, period);
    values
        .iter()
        .enumerate()
        .skip(period)
        .map(|(t, &y)| {
            let e = y - state.step(t, y, alpha, beta, gamma);
            e * e
        })
        .sum()
}

impl Forecaster for HoltWinters {
    type Fitted = HoltWintersFit;

    fn fit(&self, series: &RegularSeries, seasonal_periods: &[usize]) -> Result<HoltWintersFit> {
        let period = Self::period(seasonal_periods)?;
        let values = series.values();
        let n = values.len();
        if n < 2 * period {
            return Err(ForecastError::InsufficientData {
                needed: 2 * period,
                got: n,
            });
        }
        if is_constant(values) {
            return Err(ForecastError::model_fit(
                NAME,
                "training window has zero variance, smoothing parameters are unidentifiable",
            ));
        }

        let (alpha, beta, gamma) = match (self.alpha, self.beta, self.gamma) {
            (Some(a), Some(b), Some(g)) => (a, b, g),
            _ => {
                let start = [
                    self.alpha.unwrap_or(0.3),
                    self.beta.unwrap_or(0.1),
                    self.gamma.unwrap_or(0.1),
                ];
                // Pinned parameters get a degenerate range.
                let bounds: Vec<(f64, f64)> = [self.alpha, self.beta, self.gamma]
                    .iter()
                    .zip(BOUNDS.iter())
                    .map(|(fixed, &free)| fixed.map_or(free, |v| (v, v)))
                    .collect();
                let config = NelderMeadConfig::default().with_tolerance(1e-9);
                let result = nelder_mead(
                    |p| sse(values, period, p[0], p[1], p[2]),
                    &start,
                    Some(&bounds),
                    &config,
                )
                .require_converged(NAME)?;
                let p = &result.optimal_point;
                (p[0], p[1], p[2])
            }
        };

        let mut state = State::initial(values, period);
        let mut fitted = Vec::with_capacity(n - period);
        let mut residuals = Vec::with_capacity(n - period);
        for (t, &y) in values.iter().enumerate().skip(period) {
            let prediction = state.step(t, y, alpha, beta, gamma);
            fitted.push(prediction);
            residuals.push(y - prediction);
        }
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(ForecastError::model_fit(NAME, "recursion diverged"));
        }

        debug!(alpha, beta, gamma, period, "fitted Holt-Winters");

        Ok(HoltWintersFit {
            alpha,
            beta,
            gamma,
            period,
            n,
            state,
            fitted,
            residuals,
        })
    }

    fn min_training_len(&self, seasonal_periods: &[usize]) -> usize {
        2 * seasonal_periods.iter().min().copied().unwrap_or(1)
    }
}

/// Estimated Holt-Winters model.
#[derive(Debug, Clone)]
pub struct HoltWintersFit {
    alpha: f64,
    beta: f64,
    gamma: f64,
    period: usize,
    n: usize,
    state: State,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl HoltWintersFit {
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// The seasonal period actually modelled.
    pub fn period(&self) -> usize {
        self.period
    }

    pub fn level(&self) -> f64 {
        self.state.level
    }

    pub fn trend(&self) -> f64 {
        self.state.trend
    }
}

impl FittedForecaster for HoltWintersFit {
    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        Ok((1..=horizon)
            .map(|h| {
                let idx = (self.n + h - 1) % self.period;
                self.state.level + h as f64 * self.state.trend + self.state.seasonals[idx]
            })
            .collect())
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn num_params(&self) -> usize {
        // Three smoothing parameters, initial level and trend, m - 1 free seasonals.
        3 + 2 + self.period - 1
    }

    fn name(&self) -> String {
        format!("HoltWinters(additive, m={})", self.period)
    }

    /// `σ²[1 + Σ_{j=1}^{h-1} (α + αβj + γ·1{j mod m = 0})²]`.
    fn forecast_variance(&self, h: usize) -> f64 {
        let growth: f64 = (1..h)
            .map(|j| {
                let seasonal = if j % self.period == 0 { self.gamma } else { 0.0 };
                (self.alpha + self.alpha * self.beta * j as f64 + seasonal).powi(2)
            })
            .sum();
        self.residual_variance() * (1.0 + growth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HourWindow;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: Vec<f64>) -> RegularSeries {
        RegularSeries::from_values(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Duration::hours(1),
            HourWindow::full_day(),
            values,
        )
        .unwrap()
    }

    fn seasonal_data(n: usize, period: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * (i % period) as f64 / period as f64;
                50.0 + 0.2 * i as f64 + 10.0 * phase.sin() + ((i * 37) % 7) as f64 * 0.2
            })
            .collect()
    }

    #[test]
    fn fits_and_forecasts_seasonal_pattern() {
        let data = seasonal_data(96, 12);
        let fit = HoltWinters::auto().fit(&series(data.clone()), &[12]).unwrap();

        assert_eq!(fit.period(), 12);
        assert!(fit.alpha() > 0.0 && fit.alpha() < 1.0);
        assert_eq!(fit.residuals().len(), 96 - 12);

        let forecast = fit.predict(12).unwrap();
        assert_eq!(forecast.len(), 12);
        // Peak of the sine at phase 3 stays above the trough at phase 9.
        assert!(forecast[3] > forecast[9] + 10.0);
    }

    #[test]
    fn uses_shortest_period() {
        let data = seasonal_data(120, 6);
        let fit = HoltWinters::auto().fit(&series(data), &[6, 24]).unwrap();
        assert_eq!(fit.period(), 6);
    }

    #[test]
    fn fixed_parameters_are_kept() {
        let data = seasonal_data(48, 12);
        let fit = HoltWinters::with_params(0.5, 0.2, 0.3)
            .fit(&series(data), &[12])
            .unwrap();
        assert_relative_eq!(fit.alpha(), 0.5);
        assert_relative_eq!(fit.beta(), 0.2);
        assert_relative_eq!(fit.gamma(), 0.3);
    }

    #[test]
    fn constant_training_window_fails_fit() {
        let err = HoltWinters::auto()
            .fit(&series(vec![0.0; 48]), &[12])
            .unwrap_err();
        assert!(matches!(err, ForecastError::ModelFit { .. }));
    }

    #[test]
    fn requires_two_cycles() {
        let err = HoltWinters::auto()
            .fit(&series(seasonal_data(20, 12)), &[12])
            .unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { needed: 24, got: 20 });
        assert!(HoltWinters::auto().fit(&series(seasonal_data(30, 12)), &[]).is_err());
    }

    #[test]
    fn forecast_variance_grows() {
        let fit = HoltWinters::auto()
            .fit(&series(seasonal_data(96, 12)), &[12])
            .unwrap();
        assert_relative_eq!(fit.forecast_variance(1), fit.residual_variance());
        assert!(fit.forecast_variance(13) > fit.forecast_variance(2));
    }
}
