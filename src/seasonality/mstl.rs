//! MSTL (Multiple Seasonal-Trend decomposition using LOESS) implementation.
//!
//! Handles nested cycles such as intraday and intraweek patterns in hourly
//! data by refining one seasonal component per period in turn.

use super::stl::STL;
use crate::error::{ForecastError, Result};

/// Result of MSTL decomposition.
#[derive(Debug, Clone)]
pub struct MSTLResult {
    pub trend: Vec<f64>,
    /// Seasonal components, one per period in ascending period order.
    pub seasonal_components: Vec<Vec<f64>>,
    pub seasonal_periods: Vec<usize>,
    pub remainder: Vec<f64>,
}

/// MSTL decomposition for multiple seasonal periods.
#[derive(Debug, Clone)]
pub struct MSTL {
    periods: Vec<usize>,
    iterations: usize,
    robust: bool,
}

impl MSTL {
    /// Create a decomposer; periods must be strictly increasing.
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        if periods.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one seasonal period is required".to_string(),
            ));
        }
        if periods.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal periods must be strictly increasing, got {periods:?}"
            )));
        }
        Ok(Self {
            periods,
            iterations: 2,
            robust: false,
        })
    }

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

    /// Decompose the series.
    ///
    /// Within each iteration the periods are visited in ascending order: the
    /// current estimate of that period's component is added back to the
    /// deseasonalized series, re-estimated by STL and removed again. The trend
    /// of the final STL fit is the trend.
    pub fn decompose(&self, series: &[f64]) -> Result<MSTLResult> {
        let n = series.len();
        let stls = self
            .periods
            .iter()
            .map(|&period| {
                if period >= n {
                    return Err(ForecastError::PeriodExceedsSeries { period, len: n });
                }
                let stl = STL::new(period)?;
                Ok(if self.robust { stl.robust() } else { stl })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut seasonal_components = vec![vec![0.0; n]; self.periods.len()];
        let mut deseasonalized = series.to_vec();
        let mut trend = vec![0.0; n];

        for _ in 0..self.iterations {
            for (component, stl) in seasonal_components.iter_mut().zip(stls.iter()) {
                for (d, s) in deseasonalized.iter_mut().zip(component.iter()) {
                    *d += s;
                }
                let fit = stl.decompose(&deseasonalized)?;
                for (d, s) in deseasonalized.iter_mut().zip(fit.seasonal.iter()) {
                    *d -= s;
                }
                *component = fit.seasonal;
                trend = fit.trend;
            }
        }

        let remainder = deseasonalized
            .iter()
            .zip(trend.iter())
            .map(|(d, t)| d - t)
            .collect();

        Ok(MSTLResult {
            trend,
            seasonal_components,
            seasonal_periods: self.periods.clone(),
            remainder,
        })
    }
}
