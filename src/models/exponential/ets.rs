//! Non-seasonal ETS state space models with additive errors.
//!
//! Used on deseasonalized series, so only the error and trend components
//! vary: ETS(A,N,N), ETS(A,A,N) and ETS(A,Ad,N). Recursions in error
//! correction form:
//! - `ŷ_t = l_{t-1} + φ b_{t-1}`
//! - `l_t = ŷ_t + α e_t`
//! - `b_t = φ b_{t-1} + β e_t`

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::RegularSeries;
use crate::error::{ForecastError, Result};
use crate::models::{FittedForecaster, Forecaster};
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};

const NAME: &str = "ETS";
const SMOOTHING_BOUNDS: (f64, f64) = (0.0001, 0.9999);
const PHI_BOUNDS: (f64, f64) = (0.8, 0.98);
/// Floor on the innovation variance so a perfectly fitted series keeps a finite likelihood.
const MIN_SIGMA2: f64 = 1e-12;

/// Trend component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    None,
    Additive,
    Damped,
}

impl TrendType {
    const ALL: [TrendType; 3] = [TrendType::None, TrendType::Additive, TrendType::Damped];

    fn code(self) -> &'static str {
        match self {
            TrendType::None => "N",
            TrendType::Additive => "A",
            TrendType::Damped => "Ad",
        }
    }

    fn has_trend(self) -> bool {
        self != TrendType::None
    }

    /// Number of smoothing parameters estimated.
    fn smoothing_params(self) -> usize {
        match self {
            TrendType::None => 1,
            TrendType::Additive => 2,
            TrendType::Damped => 3,
        }
    }
}

/// ETS configuration. Without a pinned trend the candidate with the lowest
/// AICc is selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ets {
    pub trend: Option<TrendType>,
}

impl Ets {
    /// Select the trend component by AICc.
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn with_trend(trend: TrendType) -> Self {
        Self { trend: Some(trend) }
    }

    fn fit_spec(values: &[f64], trend: TrendType) -> Result<EtsFit> {
        let n = values.len();
        let init = initial_states(values, trend);

        let (start, bounds): (Vec<f64>, Vec<(f64, f64)>) = match trend {
            TrendType::None => (vec![0.3], vec![SMOOTHING_BOUNDS]),
            TrendType::Additive => (vec![0.3, 0.05], vec![SMOOTHING_BOUNDS; 2]),
            TrendType::Damped => (
                vec![0.3, 0.05, 0.9],
                vec![SMOOTHING_BOUNDS, SMOOTHING_BOUNDS, PHI_BOUNDS],
            ),
        };

        let objective = |p: &[f64]| {
            let params = Params::from_slice(trend, p);
            let sse = run(values, init, params).sse;
            let sigma2 = (sse / (n - 1) as f64).max(MIN_SIGMA2);
            (n - 1) as f64 * sigma2.ln()
        };
        let config = NelderMeadConfig::default().with_tolerance(1e-9);
        let result = nelder_mead(objective, &start, Some(&bounds), &config)
            .require_converged(NAME)?;

        let params = Params::from_slice(trend, &result.optimal_point);
        let pass = run(values, init, params);
        if !pass.sse.is_finite() {
            return Err(ForecastError::model_fit(NAME, "recursion diverged"));
        }

        let n_eff = (n - 1) as f64;
        let sigma2 = (pass.sse / n_eff).max(MIN_SIGMA2);
        let log_likelihood = -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = trend.smoothing_params() + 1 + usize::from(trend.has_trend());
        let aic = -2.0 * log_likelihood + 2.0 * k as f64;
        let aicc = if n_eff > k as f64 + 1.0 {
            aic + 2.0 * (k * (k + 1)) as f64 / (n_eff - k as f64 - 1.0)
        } else {
            f64::INFINITY
        };

        Ok(EtsFit {
            trend,
            params,
            level: pass.level,
            slope: pass.slope,
            fitted: pass.fitted,
            residuals: pass.residuals,
            log_likelihood,
            aicc,
            k,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Params {
    alpha: f64,
    beta: f64,
    phi: f64,
}

impl Params {
    fn from_slice(trend: TrendType, p: &[f64]) -> Self {
        match trend {
            TrendType::None => Self {
                alpha: p[0],
                beta: 0.0,
                phi: 0.0,
            },
            TrendType::Additive => Self {
                alpha: p[0],
                beta: p[1],
                phi: 1.0,
            },
            TrendType::Damped => Self {
                alpha: p[0],
                beta: p[1],
                phi: p[2],
            },
        }
    }
}

struct Pass {
    level: f64,
    slope: f64,
    sse: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

fn initial_states(values: &[f64], trend: TrendType) -> (f64, f64) {
    let slope = if trend.has_trend() {
        values[1] - values[0]
    } else {
        0.0
    };
    (values[0], slope)
}

/// Run the recursions from the second observation on.
fn run(values: &[f64], (level, slope): (f64, f64), params: Params) -> Pass {
    let mut level = level;
    let mut slope = slope;
    let mut fitted = Vec::with_capacity(values.len() - 1);
    let mut residuals = Vec::with_capacity(values.len() - 1);
    let mut sse = 0.0;

    for &y in &values[1..] {
        let prediction = level + params.phi * slope;
        let e = y - prediction;
        level = prediction + params.alpha * e;
        slope = params.phi * slope + params.beta * e;
        sse += e * e;
        fitted.push(prediction);
        residuals.push(e);
    }

    Pass {
        level,
        slope,
        sse,
        fitted,
        residuals,
    }
}

impl Forecaster for Ets {
    type Fitted = EtsFit;

    fn fit(&self, series: &RegularSeries, _seasonal_periods: &[usize]) -> Result<EtsFit> {
        let values = series.values();
        let needed = self.min_training_len(&[]);
        if values.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: values.len(),
            });
        }

        let fit = match self.trend {
            Some(trend) => Self::fit_spec(values, trend)?,
            None => {
                let mut best: Option<EtsFit> = None;
                let mut last_err = None;
                for trend in TrendType::ALL {
                    match Self::fit_spec(values, trend) {
                        Ok(fit) => {
                            if best.as_ref().map_or(true, |b| fit.aicc < b.aicc) {
                                best = Some(fit);
                            }
                        }
                        Err(e) => {
                            debug!(trend = trend.code(), error = %e, "ETS candidate rejected");
                            last_err = Some(e);
                        }
                    }
                }
                match (best, last_err) {
                    (Some(fit), _) => fit,
                    (None, Some(e)) => return Err(e),
                    (None, None) => {
                        return Err(ForecastError::model_fit(NAME, "no candidate specification"))
                    }
                }
            }
        };

        debug!(
            spec = %fit.name(),
            alpha = fit.params.alpha,
            beta = fit.params.beta,
            phi = fit.params.phi,
            aicc = fit.aicc,
            "fitted ETS"
        );
        Ok(fit)
    }

    fn min_training_len(&self, _seasonal_periods: &[usize]) -> usize {
        4
    }
}

/// Estimated ETS model.
#[derive(Debug, Clone)]
pub struct EtsFit {
    trend: TrendType,
    params: Params,
    level: f64,
    slope: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    log_likelihood: f64,
    aicc: f64,
    k: usize,
}

impl EtsFit {
    pub fn trend(&self) -> TrendType {
        self.trend
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    pub fn beta(&self) -> Option<f64> {
        self.trend.has_trend().then_some(self.params.beta)
    }

    pub fn phi(&self) -> Option<f64> {
        (self.trend == TrendType::Damped).then_some(self.params.phi)
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn aicc(&self) -> f64 {
        self.aicc
    }

    /// `φ + φ² + … + φ^h`.
    fn damped_sum(&self, h: usize) -> f64 {
        match self.trend {
            TrendType::None => 0.0,
            TrendType::Additive => h as f64,
            TrendType::Damped => {
                let phi = self.params.phi;
                (1..=h).map(|j| phi.powi(j as i32)).sum()
            }
        }
    }
}

impl FittedForecaster for EtsFit {
    fn predict(&self, horizon: usize) -> Result<Vec<f64>> {
        Ok((1..=horizon)
            .map(|h| self.level + self.damped_sum(h) * self.slope)
            .collect())
    }

    fn fitted_values(&self) -> &[f64] {
        &self.fitted
    }

    fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    fn num_params(&self) -> usize {
        self.k
    }

    fn name(&self) -> String {
        format!("ETS(A,{},N)", self.trend.code())
    }

    /// `σ²[1 + Σ_{j=1}^{h-1} (α + β(φ + … + φ^j))²]`.
    fn forecast_variance(&self, h: usize) -> f64 {
        let growth: f64 = (1..h)
            .map(|j| (self.params.alpha + self.params.beta * self.damped_sum(j)).powi(2))
            .sum();
        self.residual_variance() * (1.0 + growth)
    }
}
