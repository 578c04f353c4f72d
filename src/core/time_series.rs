//! Regular business-hours time series.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::{align_down, HourWindow};
use crate::error::{ForecastError, Result};

/// A single `(timestamp, value)` pair, e.g. one aggregated bucket count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A gap-free series with one finite value per session slot.
///
/// Timestamps sit on a grid of `interval` steps aligned to the Unix epoch and
/// inside the hour window. Each timestamp is the next open slot after its
/// predecessor: exactly one interval later, or the first open slot of the
/// following business day.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    interval: Duration,
    window: HourWindow,
}

impl RegularSeries {
    /// Create a series, validating the session-grid invariants.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
        interval: Duration,
        window: HourWindow,
    ) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if timestamps.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::MissingValues);
        }
        window.slots_per_day(interval)?;

        let first = timestamps[0];
        if align_down(first, interval)? != first {
            return Err(ForecastError::TimestampError(format!(
                "{first} is not aligned to the {interval} grid"
            )));
        }
        if !window.contains(&first) {
            return Err(ForecastError::TimestampError(format!(
                "{first} lies outside the business-hours window"
            )));
        }
        for pair in timestamps.windows(2) {
            let expected = window.next_slot(pair[0], interval)?;
            if pair[1] != expected {
                return Err(ForecastError::TimestampError(format!(
                    "expected {expected} after {}, found {}",
                    pair[0], pair[1]
                )));
            }
        }

        Ok(Self {
            timestamps,
            values,
            interval,
            window,
        })
    }

    /// Create a series by laying `values` out on consecutive slots from `start`.
    pub fn from_values(
        start: DateTime<Utc>,
        interval: Duration,
        window: HourWindow,
        values: Vec<f64>,
    ) -> Result<Self> {
        if values.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let mut timestamps = Vec::with_capacity(values.len());
        timestamps.push(start);
        for i in 1..values.len() {
            timestamps.push(window.next_slot(timestamps[i - 1], interval)?);
        }
        Self::new(timestamps, values, interval, window)
    }

    /// A series on the same grid carrying different values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::MissingValues);
        }
        Ok(Self {
            timestamps: self.timestamps.clone(),
            values,
            interval: self.interval,
            window: self.window,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> HourWindow {
        self.window
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.timestamps[0]
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Iterate over `(timestamp, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// The series as ordered observations.
    pub fn observations(&self) -> Vec<Observation> {
        self.iter()
            .map(|(timestamp, value)| Observation { timestamp, value })
            .collect()
    }

    /// Sub-series over the index range `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end {
            return Err(ForecastError::InvalidParameter(format!(
                "slice start {start} must be before end {end}"
            )));
        }
        if end > self.len() {
            return Err(ForecastError::IndexOutOfBounds {
                index: end,
                size: self.len(),
            });
        }
        Ok(Self {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            interval: self.interval,
            window: self.window,
        })
    }

    /// The `horizon` session slots following the end of the series.
    pub fn future_timestamps(&self, horizon: usize) -> Result<Vec<DateTime<Utc>>> {
        let mut out = Vec::with_capacity(horizon);
        let mut current = self.end();
        for _ in 0..horizon {
            current = self.window.next_slot(current, self.interval)?;
            out.push(current);
        }
        Ok(out)
    }
}
