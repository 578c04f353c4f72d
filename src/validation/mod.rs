//! Residual diagnostics for a fitted model.
//!
//! Checks the two assumptions the forecast intervals rest on: one-step errors
//! are uncorrelated (Ljung-Box) and approximately normal (Shapiro-Wilk).
//!
//! # Example
//!
//! ```
//! use visitor_forecast::validation::ResidualDiagnostics;
//!
//! let residuals = vec![0.3, -0.2, 0.15, -0.4, 0.05, 0.25, -0.1, 0.12, -0.3, 0.2, -0.05, 0.1];
//! let result = ResidualDiagnostics::new().diagnose(&residuals).unwrap();
//! assert!(result.autocorrelation_pvalue >= 0.0 && result.autocorrelation_pvalue <= 1.0);
//! ```


use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::utils::stats::is_constant;

pub use residual_tests::{
    default_lags, ljung_box, shapiro_wilk, LjungBoxResult, ShapiroWilkResult, SHAPIRO_WILK_MAX_N,
};

/// Settings for [`ResidualDiagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticConfig {
    /// Ljung-Box lag; derived from the series length when unset.
    pub lags: Option<usize>,
    /// Degrees of freedom used up by the fitted model.
    pub fitdf: usize,
    /// A test passes when its p-value exceeds this level.
    pub significance: f64,
    pub seasonal_period: Option<usize>,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            lags: None,
            fitdf: 0,
            significance: 0.05,
            seasonal_period: None,
        }
    }
}

/// Outcome of both residual tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub autocorrelation_pvalue: f64,
    pub normality_pvalue: f64,
    pub autocorrelation_pass: bool,
    pub normality_pass: bool,
    pub ljung_box: LjungBoxResult,
    pub shapiro_wilk: ShapiroWilkResult,
}

impl DiagnosticResult {
    pub fn all_pass(&self) -> bool {
        self.autocorrelation_pass && self.normality_pass
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResidualDiagnostics {
    config: DiagnosticConfig,
}

impl ResidualDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DiagnosticConfig) -> Self {
        Self { config }
    }

    pub fn with_lags(mut self, lags: usize) -> Self {
        self.config.lags = Some(lags);
        self
    }

    pub fn with_fitdf(mut self, fitdf: usize) -> Self {
        self.config.fitdf = fitdf;
        self
    }

    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.config.seasonal_period = Some(period);
        self
    }

    pub fn with_significance(mut self, significance: f64) -> Self {
        self.config.significance = significance;
        self
    }

    pub fn config(&self) -> &DiagnosticConfig {
        &self.config
    }

    /// Test `residuals` for autocorrelation and normality.
    ///
    /// Low p-values are reported, not raised. Empty, too short, non-finite or
    /// constant residuals are a [`ForecastError::DiagnosticInput`].
    pub fn diagnose(&self, residuals: &[f64]) -> Result<DiagnosticResult> {
        let n = residuals.len();
        if n == 0 {
            return Err(ForecastError::DiagnosticInput("no residuals".to_string()));
        }
        if n < 3 {
            return Err(ForecastError::DiagnosticInput(format!(
                "need at least 3 residuals, got {n}"
            )));
        }
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(ForecastError::DiagnosticInput(
                "residuals contain non-finite values".to_string(),
            ));
        }
        if is_constant(residuals) {
            return Err(ForecastError::DiagnosticInput(
                "residuals are constant".to_string(),
            ));
        }
        let alpha = self.config.significance;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "significance must be in (0, 1), got {alpha}"
            )));
        }

        let lags = match self.config.lags {
            Some(h) => h.min(n - 1).max(1),
            None => default_lags(n, self.config.seasonal_period, self.config.fitdf),
        };
        let lb = ljung_box(residuals, lags, self.config.fitdf)?;
        let sw = shapiro_wilk(residuals)?;

        debug!(
            n,
            lags,
            q = lb.statistic,
            lb_p = lb.p_value,
            w = sw.w,
            sw_p = sw.p_value,
            "residual diagnostics"
        );

        Ok(DiagnosticResult {
            autocorrelation_pvalue: lb.p_value,
            normality_pvalue: sw.p_value,
            autocorrelation_pass: lb.p_value > alpha,
            normality_pass: sw.p_value > alpha,
            ljung_box: lb,
            shapiro_wilk: sw,
        })
    }
}
