//! STL (Seasonal-Trend decomposition using LOESS) implementation.
//!
//! Each inner pass detrends the series, smooths every cycle-subseries,
//! removes the low-frequency leakage with a low-pass filter and re-estimates
//! the trend from the deseasonalized series. Robust fitting adds outer passes
//! that downweight large remainders with bisquare weights.

use crate::error::{ForecastError, Result};
use crate::utils::stats::median;

/// Result of STL decomposition.
#[derive(Debug, Clone)]
pub struct STLResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
}

/// STL decomposition configuration and algorithm.
#[derive(Debug, Clone)]
pub struct STL {
    period: usize,
    /// Seasonal LOESS span (odd).
    seasonal_span: usize,
    /// Trend LOESS span (odd).
    trend_span: usize,
    /// Low-pass LOESS span (odd).
    low_pass_span: usize,
    inner_iterations: usize,
    outer_iterations: usize,
}

impl STL {
    /// Create a decomposer with spans following Cleveland et al. (1990).
    pub fn new(period: usize) -> Result<Self> {
        if period < 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal period must be at least 2, got {period}"
            )));
        }
        let seasonal_span = period | 1;
        let trend_span =
            (1.5 * period as f64 / (1.0 - 1.5 / seasonal_span as f64)).ceil() as usize | 1;

        Ok(Self {
            period,
            seasonal_span,
            trend_span,
            low_pass_span: period | 1,
            inner_iterations: 2,
            outer_iterations: 0,
        })
    }

    /// Enable robust fitting with six outer passes.
    pub fn robust(mut self) -> Self {
        self.outer_iterations = 6;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Decompose the series. Requires more observations than the period.
    pub fn decompose(&self, series: &[f64]) -> Result<STLResult> {
        let n = series.len();
        if n <= self.period {
            return Err(ForecastError::PeriodExceedsSeries {
                period: self.period,
                len: n,
            });
        }

        let mut seasonal = vec![0.0; n];
        let mut trend = vec![0.0; n];
        let mut weights = vec![1.0; n];

        for outer in 0..=self.outer_iterations {
            for _ in 0..self.inner_iterations {
                let detrended: Vec<f64> =
                    series.iter().zip(trend.iter()).map(|(y, t)| y - t).collect();

                let cycles = self.smooth_cycle_subseries(&detrended, &weights);
                let low_pass = self.low_pass_filter(&cycles);
                for i in 0..n {
                    seasonal[i] = cycles[i] - low_pass[i];
                }

                let deseasonalized: Vec<f64> = series
                    .iter()
                    .zip(seasonal.iter())
                    .map(|(y, s)| y - s)
                    .collect();
                trend = tricube_smooth(&deseasonalized, self.trend_span, &weights);
            }

            if outer < self.outer_iterations {
                let remainder = remainder_of(series, &trend, &seasonal);
                weights = bisquare_weights(&remainder);
            }
        }

        let remainder = remainder_of(series, &trend, &seasonal);
        Ok(STLResult {
            trend,
            seasonal,
            remainder,
        })
    }

    fn smooth_cycle_subseries(&self, detrended: &[f64], weights: &[f64]) -> Vec<f64> {
        let mut result = vec![0.0; detrended.len()];
        for phase in 0..self.period {
            let indices: Vec<usize> = (phase..detrended.len()).step_by(self.period).collect();
            let values: Vec<f64> = indices.iter().map(|&i| detrended[i]).collect();
            let sub_weights: Vec<f64> = indices.iter().map(|&i| weights[i]).collect();

            let smoothed = tricube_smooth(&values, self.seasonal_span, &sub_weights);
            for (&i, s) in indices.iter().zip(smoothed) {
                result[i] = s;
            }
        }
        result
    }

    /// Moving averages of length period, period and 3, then LOESS.
    fn low_pass_filter(&self, series: &[f64]) -> Vec<f64> {
        let smoothed = moving_average(series, self.period);
        let smoothed = moving_average(&smoothed, self.period);
        let smoothed = moving_average(&smoothed, 3);
        tricube_smooth(&smoothed, self.low_pass_span, &vec![1.0; series.len()])
    }
}

fn remainder_of(series: &[f64], trend: &[f64], seasonal: &[f64]) -> Vec<f64> {
    series
        .iter()
        .zip(trend.iter())
        .zip(seasonal.iter())
        .map(|((y, t), s)| y - t - s)
        .collect()
}

/// Centered moving average, shrinking the window at the edges.
fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    let n = series.len();
    let half = window / 2;
    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            series[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect()
}

/// Locally weighted mean with tricube kernel over `span` neighbours.
fn tricube_smooth(values: &[f64], span: usize, weights: &[f64]) -> Vec<f64> {
    let n = values.len();
    let half = span / 2;
    let max_dist = half as f64 + 1.0;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);

            let mut sum_w = 0.0;
            let mut sum_v = 0.0;
            for j in start..end {
                let u = i.abs_diff(j) as f64 / max_dist;
                let w = (1.0 - u.powi(3)).powi(3) * weights[j];
                sum_w += w;
                sum_v += w * values[j];
            }
            if sum_w > 0.0 {
                sum_v / sum_w
            } else {
                values[i]
            }
        })
        .collect()
}

/// Bisquare robustness weights scaled by six times the median absolute remainder.
fn bisquare_weights(remainder: &[f64]) -> Vec<f64> {
    let abs: Vec<f64> = remainder.iter().map(|r| r.abs()).collect();
    let h = 6.0 * median(&abs);
    if h.is_nan() || h <= 1e-10 {
        return vec![1.0; remainder.len()];
    }
    abs.iter()
        .map(|a| {
            let u = a / h;
            if u < 1.0 {
                (1.0 - u * u).powi(2)
            } else {
                0.0
            }
        })
        .collect()
}
