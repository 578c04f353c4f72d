//! Statistical utility functions.

use statrs::function::erf::{erfc, erfc_inv};

/// Quantile function of the standard normal distribution.
///
/// ```
/// use visitor_forecast::utils::stats::quantile_normal;
///
/// let z = quantile_normal(0.975);
/// assert!((z - 1.959964).abs() < 1e-5);
/// ```
pub fn quantile_normal(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// Cumulative distribution function of the standard normal distribution.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Calculate the median of a slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Sample autocorrelation at `lag`, normalized by the lag-0 sum of squares.
///
/// Returns `None` when the lag is out of range or the values are constant.
pub fn autocorrelation(values: &[f64], lag: usize) -> Option<f64> {
    let n = values.len();
    if lag == 0 || n <= lag {
        return None;
    }
    let m = mean(values);
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator <= f64::EPSILON * n as f64 * m.abs().max(1.0) {
        return None;
    }
    let numerator: f64 = (lag..n)
        .map(|i| (values[i] - m) * (values[i - lag] - m))
        .sum();
    Some(numerator / denominator)
}

/// Whether all values are equal up to floating point noise.
pub fn is_constant(values: &[f64]) -> bool {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    max - min <= 1e-12 * max.abs().max(min.abs()).max(1.0)
}
