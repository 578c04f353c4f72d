//! Forecast result structure for holding predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Point predictions for consecutive future slots, with optional intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    timestamps: Vec<DateTime<Utc>>,
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
    level: Option<f64>,
}

impl Forecast {
    /// Create a forecast from point predictions.
    pub fn new(timestamps: Vec<DateTime<Utc>>, point: Vec<f64>) -> Result<Self> {
        if point.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "forecast horizon must be positive".to_string(),
            ));
        }
        if timestamps.len() != point.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: point.len(),
                got: timestamps.len(),
            });
        }
        Ok(Self {
            timestamps,
            point,
            lower: None,
            upper: None,
            level: None,
        })
    }

    /// Attach prediction intervals at the given confidence level.
    pub fn with_intervals(mut self, lower: Vec<f64>, upper: Vec<f64>, level: f64) -> Result<Self> {
        for bound in [&lower, &upper] {
            if bound.len() != self.point.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: self.point.len(),
                    got: bound.len(),
                });
            }
        }
        self.lower = Some(lower);
        self.upper = Some(upper);
        self.level = Some(level);
        Ok(self)
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    /// Confidence level of the intervals, if any.
    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }
}
