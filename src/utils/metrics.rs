//! Accuracy metrics for forecast evaluation.

use serde::{Deserialize, Serialize};

use super::stats::autocorrelation;
use crate::error::{ForecastError, Result};

/// Holdout accuracy of one model variant.
///
/// Errors are `actual - forecast`. Percentage measures are `None` when an
/// actual is zero; MASE is `None` without a usable in-sample scale; ACF1 is
/// `None` when the errors are too few or constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub model_tag: String,
    /// Mean Error
    pub me: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Percentage Error
    pub mpe: Option<f64>,
    /// Mean Absolute Percentage Error
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// Mean Absolute Scaled Error
    pub mase: Option<f64>,
    /// Lag-1 autocorrelation of the errors
    pub acf1: Option<f64>,
}

/// Mean absolute error of the seasonal naive method on the training data.
///
/// This is the MASE denominator. Returns `None` when the training data is no
/// longer than the period or the naive error is zero.
pub fn mase_scale(training: &[f64], period: usize) -> Option<f64> {
    let period = period.max(1);
    if training.len() <= period {
        return None;
    }
    let scale = training
        .windows(period + 1)
        .map(|w| (w[period] - w[0]).abs())
        .sum::<f64>()
        / (training.len() - period) as f64;
    (scale > 0.0 && scale.is_finite()).then_some(scale)
}

/// Score `forecast` against `actual`, pairing by index.
///
/// `scale` is the MASE denominator, see [`mase_scale`].
pub fn accuracy(
    model_tag: &str,
    actual: &[f64],
    forecast: &[f64],
    scale: Option<f64>,
) -> Result<AccuracyReport> {
    if actual.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != forecast.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: forecast.len(),
        });
    }
    if actual.iter().chain(forecast.iter()).any(|v| !v.is_finite()) {
        return Err(ForecastError::ComputationError(format!(
            "non-finite value while scoring {model_tag}"
        )));
    }

    let n = actual.len() as f64;
    let errors: Vec<f64> = actual.iter().zip(forecast).map(|(a, f)| a - f).collect();

    let me = errors.iter().sum::<f64>() / n;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;

    let (mpe, mape) = if actual.iter().any(|a| *a == 0.0) {
        (None, None)
    } else {
        let pct: Vec<f64> = errors
            .iter()
            .zip(actual)
            .map(|(e, a)| 100.0 * e / a)
            .collect();
        (
            Some(pct.iter().sum::<f64>() / n),
            Some(pct.iter().map(|p| p.abs()).sum::<f64>() / n),
        )
    };

    let smape = actual
        .iter()
        .zip(forecast)
        .map(|(a, f)| {
            let denom = a.abs() + f.abs();
            if denom == 0.0 {
                0.0
            } else {
                200.0 * (a - f).abs() / denom
            }
        })
        .sum::<f64>()
        / n;

    Ok(AccuracyReport {
        model_tag: model_tag.to_string(),
        me,
        mae,
        mse,
        rmse: mse.sqrt(),
        mpe,
        mape,
        smape,
        mase: scale.map(|s| mae / s),
        acf1: autocorrelation(&errors, 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_forecast() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let report = accuracy("m", &actual, &actual, Some(1.0)).unwrap();
        assert_relative_eq!(report.mae, 0.0);
        assert_relative_eq!(report.rmse, 0.0);
        assert_relative_eq!(report.smape, 0.0);
        assert_eq!(report.mape, Some(0.0));
        assert_eq!(report.mase, Some(0.0));
        assert!(report.acf1.is_none());
    }

    #[test]
    fn known_values() {
        let actual = [10.0, 20.0, 30.0, 40.0];
        let forecast = [12.0, 18.0, 33.0, 40.0];
        let report = accuracy("m", &actual, &forecast, None).unwrap();

        assert_relative_eq!(report.me, (-2.0 + 2.0 - 3.0 + 0.0) / 4.0);
        assert_relative_eq!(report.mae, 7.0 / 4.0);
        assert_relative_eq!(report.mse, 17.0 / 4.0);
        assert_relative_eq!(report.rmse, (17.0_f64 / 4.0).sqrt());
        assert_relative_eq!(report.mape.unwrap(), (20.0 + 10.0 + 10.0 + 0.0) / 4.0);
        assert_relative_eq!(report.mpe.unwrap(), (-20.0 + 10.0 - 10.0) / 4.0);
        assert!(report.mase.is_none());
        assert!(report.acf1.is_some());
    }

    #[test]
    fn zero_actuals_disable_percentage_errors() {
        let report = accuracy("m", &[0.0, 1.0], &[0.5, 1.0], None).unwrap();
        assert!(report.mape.is_none());
        assert!(report.mpe.is_none());
        assert!(report.smape > 0.0);
    }

    #[test]
    fn both_zero_smape_term_is_zero() {
        let report = accuracy("m", &[0.0, 0.0], &[0.0, 0.0], None).unwrap();
        assert_relative_eq!(report.smape, 0.0);
    }

    #[test]
    fn mase_scale_uses_seasonal_naive() {
        let training = [1.0, 2.0, 3.0, 2.0, 3.0, 4.0];
        // Lag-3 differences: 1, 1, 1.
        assert_relative_eq!(mase_scale(&training, 3).unwrap(), 1.0);
        assert!(mase_scale(&training, 6).is_none());
        assert!(mase_scale(&[5.0; 10], 1).is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(accuracy("m", &[], &[], None).is_err());
        assert!(accuracy("m", &[1.0], &[1.0, 2.0], None).is_err());
        assert!(accuracy("m", &[1.0], &[f64::NAN], None).is_err());
    }

    #[test]
    fn deterministic() {
        let actual = [3.0, 1.0, 4.0, 1.0, 5.0];
        let forecast = [2.5, 1.5, 3.5, 2.0, 4.0];
        let a = accuracy("m", &actual, &forecast, Some(0.7)).unwrap();
        let b = accuracy("m", &actual, &forecast, Some(0.7)).unwrap();
        assert_eq!(a, b);
    }
}
