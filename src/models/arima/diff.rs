//! Differencing utilities for ARIMA models.

/// Apply `d` rounds of first differencing.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo `d` rounds of differencing for values that continue `history`.
///
/// `forecast` holds predictions of the `d`-times differenced series for the
/// steps after `history`; the result holds the matching predictions on the
/// original scale. Each level is recovered by cumulating onto the last value
/// of the next-lower differenced history.
pub fn integrate(forecast: &[f64], history: &[f64], d: usize) -> Vec<f64> {
    if d == 0 {
        return forecast.to_vec();
    }
    let lower = difference(history, d - 1);
    let mut running = lower.last().copied().unwrap_or(0.0);
    let level: Vec<f64> = forecast
        .iter()
        .map(|w| {
            running += w;
            running
        })
        .collect();
    integrate(&level, history, d - 1)
}

/// Coefficients of `(1 - B)^d` beyond the leading 1, as AR-style weights.
///
/// `y_t - Σ c_i y_{t-i}` is the `d`-th difference of `y`.
pub fn differencing_polynomial(d: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    poly.iter().skip(1).map(|c| -c).collect()
}
