//! Classical additive decomposition by centered moving averages.

use crate::error::{ForecastError, Result};

/// Result of a classical decomposition.
#[derive(Debug, Clone)]
pub struct ClassicalResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
}

/// Decompose `series` into trend, seasonal and remainder for one period.
///
/// The trend is a centered moving average over one full cycle (a 2×m average
/// for even periods). The half-cycle at each edge where the average is
/// undefined is filled by extending a least-squares line through the nearest
/// defined trend values, so the trend covers every index. The seasonal cycle
/// is the per-phase mean of the detrended series, shifted to zero mean.
pub fn classical_decompose(series: &[f64], period: usize) -> Result<ClassicalResult> {
    let n = series.len();
    if period < 2 {
        return Err(ForecastError::InvalidParameter(format!(
            "seasonal period must be at least 2, got {period}"
        )));
    }
    if n <= period {
        return Err(ForecastError::PeriodExceedsSeries { period, len: n });
    }

    let (first, averaged) = centered_moving_average(series, period);
    let trend = extend_edges(&averaged, first, n, period);

    let mut phase_sum = vec![0.0; period];
    let mut phase_count = vec![0usize; period];
    for (i, (&y, &t)) in series.iter().zip(trend.iter()).enumerate() {
        phase_sum[i % period] += y - t;
        phase_count[i % period] += 1;
    }
    let mut cycle: Vec<f64> = phase_sum
        .iter()
        .zip(phase_count.iter())
        .map(|(s, &c)| s / c as f64)
        .collect();
    let offset = cycle.iter().sum::<f64>() / period as f64;
    for c in &mut cycle {
        *c -= offset;
    }

    let seasonal: Vec<f64> = (0..n).map(|i| cycle[i % period]).collect();
    let remainder: Vec<f64> = series
        .iter()
        .zip(trend.iter())
        .zip(seasonal.iter())
        .map(|((y, t), s)| y - t - s)
        .collect();

    Ok(ClassicalResult {
        trend,
        seasonal,
        remainder,
    })
}

/// Centered moving average; returns the first defined index and the defined values.
fn centered_moving_average(series: &[f64], period: usize) -> (usize, Vec<f64>) {
    let n = series.len();
    let half = period / 2;
    let averaged = (half..n - half)
        .map(|i| {
            if period % 2 == 1 {
                series[i - half..=i + half].iter().sum::<f64>() / period as f64
            } else {
                let inner: f64 = series[i - half + 1..i + half].iter().sum();
                (0.5 * series[i - half] + inner + 0.5 * series[i + half]) / period as f64
            }
        })
        .collect();
    (half, averaged)
}

fn extend_edges(averaged: &[f64], first: usize, n: usize, period: usize) -> Vec<f64> {
    let mut trend = vec![0.0; n];
    trend[first..first + averaged.len()].copy_from_slice(averaged);

    let k = period.min(averaged.len());
    let (a, b) = line_fit(first, &averaged[..k]);
    for i in 0..first {
        trend[i] = a + b * i as f64;
    }

    let last = first + averaged.len();
    let tail_start = last - k;
    let (a, b) = line_fit(tail_start, &averaged[averaged.len() - k..]);
    for i in last..n {
        trend[i] = a + b * i as f64;
    }
    trend
}

/// Least-squares line through `(offset + j, ys[j])`; slope is zero for one point.
fn line_fit(offset: usize, ys: &[f64]) -> (f64, f64) {
    let m = ys.len() as f64;
    let x_mean = offset as f64 + (m - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / m;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (j, &y) in ys.iter().enumerate() {
        let dx = (offset + j) as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (y_mean - slope * x_mean, slope)
}
