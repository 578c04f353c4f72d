//! Non-seasonal ARIMA(p, d, q) estimated by conditional sum of squares.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::diff::{difference, differencing_polynomial, integrate};
use crate::core::RegularSeries;
use crate::error::{ForecastError, Result};
use crate::models::{FittedForecaster, Forecaster};
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};

const NAME: &str = "ARIMA";
const COEF_BOUNDS: (f64, f64) = (-0.99, 0.99);

/// ARIMA order `(p, d, q)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl Default for ArimaOrder {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// ARIMA configuration.
///
/// The mean of the differenced series is estimated when `include_mean` is
/// set; by default only for undifferenced models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Arima {
    pub order: ArimaOrder,
    pub include_mean: Option<bool>,
}

impl Arima {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            order: ArimaOrder::new(p, d, q),
            include_mean: None,
        }
    }

    pub fn with_mean(mut self, include_mean: bool) -> Self {
        self.include_mean = Some(include_mean);
        self
    }

    fn has_mean(&self) -> bool {
        self.include_mean.unwrap_or(self.order.d == 0)
    }
}

/// Conditional one-step errors of the differenced series; the first `p` are zero.
fn css_residuals(w: &[f64], mean: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut residuals = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut prediction = mean;
        for (i, phi) in ar.iter().enumerate() {
            prediction += phi * (w[t - 1 - i] - mean);
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                prediction += theta * residuals[t - 1 - j];
            }
        }
        residuals[t] = w[t] - prediction;
    }
    residuals
}

impl Forecaster for Arima {
    type Fitted = ArimaFit;

    fn fit(&self, series: &RegularSeries, _seasonal_periods: &[usize]) -> Result<ArimaFit> {
        let ArimaOrder { p, d, q } = self.order;
        if d > 2 {
            return Err(ForecastError::InvalidParameter(format!(
                "differencing order {d} is not supported (max 2)"
            )));
        }
        let values = series.values();
        let needed = self.min_training_len(&[]);
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: values.len(),
            });
        }

        let w = difference(values, d);
        let has_mean = self.has_mean();
        let w_mean = w.iter().sum::<f64>() / w.len() as f64;
        let split = |params: &[f64]| -> (f64, Vec<f64>, Vec<f64>) {
            let (mean, rest) = if has_mean {
                (params[0], &params[1..])
            } else {
                (0.0, params)
            };
            (mean, rest[..p].to_vec(), rest[p..].to_vec())
        };

        let mut start = Vec::with_capacity(p + q + 1);
        let mut bounds = Vec::with_capacity(p + q + 1);
        if has_mean {
            start.push(w_mean);
            bounds.push((f64::NEG_INFINITY, f64::INFINITY));
        }
        start.extend(std::iter::repeat(0.1).take(p));
        start.extend(std::iter::repeat(0.0).take(q));
        bounds.extend(std::iter::repeat(COEF_BOUNDS).take(p + q));

        let params = if start.is_empty() {
            Vec::new()
        } else {
            let objective = |params: &[f64]| {
                let (mean, ar, ma) = split(params);
                css_residuals(&w, mean, &ar, &ma)[p..]
                    .iter()
                    .map(|e| e * e)
                    .sum::<f64>()
            };
            let config = NelderMeadConfig::default().with_tolerance(1e-9);
            nelder_mead(objective, &start, Some(&bounds), &config)
                .require_converged(NAME)?
                .optimal_point
        };

        let (mean, ar, ma) = split(&params);
        let all_residuals = css_residuals(&w, mean, &ar, &ma);
        let residuals = all_residuals[p..].to_vec();
        if residuals.iter().any(|e| !e.is_finite()) {
            return Err(ForecastError::model_fit(NAME, "conditional residuals diverged"));
        }

        // Residuals of the differenced series are one-step errors of the original.
        let offset = d + p;
        let fitted: Vec<f64> = values[offset..]
            .iter()
            .zip(residuals.iter())
            .map(|(y, e)| y - e)
            .collect();

        let n_eff = residuals.len() as f64;
        let css: f64 = residuals.iter().map(|e| e * e).sum();
        let sigma2 = css / n_eff;
        let k = p + q + usize::from(has_mean);
        let log_likelihood = if sigma2 > 0.0 {
            -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0)
        } else {
            f64::INFINITY
        };
        let aic = -2.0 * log_likelihood + 2.0 * (k + 1) as f64;
        let bic = -2.0 * log_likelihood + (k + 1) as f64 * n_eff.ln();

        debug!(order = %self.order, mean, ?ar, ?ma, sigma2, "fitted ARIMA");

        Ok(ArimaFit {
            order: self.order,
            has_mean,
            mean,
            ar,
            ma,
            history: values.to_vec(),
            differenced: w,
            innovations: all_residuals,
            fitted,
            residuals,
            aic,
            bic,
        })
    }

    fn min_training_len(&self, _seasonal_periods: &[usize]) -> usize {
        let ArimaOrder { p, d, q } = self.order;
        d + p + q + 3
    }
}

/// Estimated ARIMA model.
#[derive(Debug, Clone)]
pub struct ArimaFit {
    order: ArimaOrder,
    has_mean: bool,
    mean: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    history: Vec<f64>,
    differenced: Vec<f64>,
    innovations: Vec<f64>,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    aic: f64,
    bic: f64,
}

impl ArimaFit {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// Mean of the differenced series (zero when not estimated).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// MA(∞) weights ψ_0..ψ_{h-1} of the integrated process.
    fn psi_weights(&self, h: usize) -> Vec<f64> {
        // Full AR polynomial: φ(B)(1 - B)^d.
        let diff_poly = differencing_polynomial(self.order.d);
        let mut ar_full = vec![0.0; self.ar.len() + diff_poly.len()];
        let mut phi = vec![1.0];
        phi.extend(self.ar.iter().map(|c| -c));
        let mut delta = vec![1.0];
        delta.extend(diff_poly.iter().map(|c| -c));
        for (i, a) in phi.iter().enumerate() {
            for (j, b) in delta.iter().enumerate() {
                if i + j > 0 {
                    ar_full[i + j - 1] -= a * b;
                }
            }
        }

        let mut psi = vec![0.0; h];
        if h > 0 {
            psi[0] = 1.0;
        }
        for j in 1..h {
            let mut value = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for (i, c) in ar_full.iter().enumerate() {
                if j > i {
                    value += c * psi[j - 1 - i];
                }
            }
            psi[j] = value;
        }
        psi
    }
}

impl FittedForecaster for ArimaFit {
    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        let mut w = self.differenced.clone();
        let mut e = self.innovations.clone();
        let n = w.len();

        for t in n..n + horizon {
            let mut prediction = self.mean;
            for (i, phi) in self.ar.iter().enumerate() {
                if t > i {
                    prediction += phi * (w[t - 1 - i] - self.mean);
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if t > j {
                    prediction += theta * e[t - 1 - j];
                }
            }
            w.push(prediction);
            e.push(0.0);
        }

        Ok(integrate(&w[n..], &self.history, self.order.d))
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn num_params(&self) -> usize {
        self.ar.len() + self.ma.len() + usize::from(self.has_mean)
    }

    fn name(&self) -> String {
        format!("ARIMA{}", self.order)
    }

    /// `σ² Σ_{j<h} ψ_j²`.
    fn forecast_variance(&self, h: usize) -> f64 {
        let psi_sq: f64 = self.psi_weights(h).iter().map(|p| p * p).sum();
        self.residual_variance() * psi_sq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HourWindow;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn series(values: Vec<f64>) -> RegularSeries {
        RegularSeries::from_values(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Duration::hours(1),
            HourWindow::full_day(),
            values,
        )
        .unwrap()
    }

    fn ar1(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut y = vec![0.0; n];
        for t in 1..n {
            y[t] = phi * y[t - 1] + rng.gen_range(-1.0..1.0);
        }
        y
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let fit = Arima::new(1, 0, 0)
            .fit(&series(ar1(400, 0.7, 7)), &[])
            .unwrap();
        assert_relative_eq!(fit.ar_coefficients()[0], 0.7, epsilon = 0.1);
        assert_eq!(fit.name(), "ARIMA(1,0,0)");
    }

    #[test]
    fn random_walk_forecast_is_last_value() {
        let data: Vec<f64> = ar1(100, 1.0, 3);
        let last = data[99];
        let fit = Arima::new(0, 1, 0).fit(&series(data), &[]).unwrap();
        for f in fit.predict(5).unwrap() {
            assert_relative_eq!(f, last, epsilon = 1e-12);
        }
        // Random walk variance grows linearly.
        assert_relative_eq!(
            fit.forecast_variance(4),
            4.0 * fit.residual_variance(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn drift_continues_linear_trend() {
        let data: Vec<f64> = (0..40).map(|i| 3.0 + 0.5 * i as f64).collect();
        let fit = Arima::new(0, 1, 0).with_mean(true).fit(&series(data), &[]).unwrap();
        let forecast = fit.predict(2).unwrap();
        assert_relative_eq!(forecast[0], 23.0, epsilon = 1e-4);
        assert_relative_eq!(forecast[1], 23.5, epsilon = 1e-4);
    }

    #[test]
    fn default_order_fits_and_aligns_residuals() {
        let data: Vec<f64> = ar1(120, 0.5, 11)
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.1 * i as f64)
            .collect();
        let fit = Arima::default().fit(&series(data.clone()), &[]).unwrap();
        assert_eq!(fit.order(), ArimaOrder::new(1, 1, 1));
        assert_eq!(fit.fitted_values().len(), fit.residuals().len());
        let offset = data.len() - fit.residuals().len();
        for (i, (f, r)) in fit.fitted_values().iter().zip(fit.residuals()).enumerate() {
            assert_relative_eq!(f + r, data[offset + i], epsilon = 1e-9);
        }
        assert!(fit.aic().is_finite());
        assert!(fit.bic() > fit.aic());
    }

    #[test]
    fn all_zero_series_fits() {
        let fit = Arima::default().fit(&series(vec![0.0; 30]), &[]).unwrap();
        for f in fit.predict(3).unwrap() {
            assert_relative_eq!(f, 0.0);
        }
    }

    #[test]
    fn psi_weights_of_ar1() {
        let fit = Arima::new(1, 0, 0).fit(&series(ar1(300, 0.6, 5)), &[]).unwrap();
        let phi = fit.ar_coefficients()[0];
        let psi = fit.psi_weights(4);
        assert_relative_eq!(psi[0], 1.0);
        assert_relative_eq!(psi[1], phi, epsilon = 1e-12);
        assert_relative_eq!(psi[3], phi.powi(3), epsilon = 1e-12);
    }

    #[test]
    fn rejects_high_differencing_and_short_series() {
        assert!(Arima::new(0, 3, 0).fit(&series(ar1(50, 0.5, 1)), &[]).is_err());
        assert!(Arima::new(2, 1, 2).fit(&series(vec![1.0, 2.0, 3.0]), &[]).is_err());
    }
}
