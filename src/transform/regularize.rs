//! Regularization of sparse observations onto the business-hours grid.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::calendar::{align_down, align_up, interval_seconds};
use crate::core::{HourWindow, Observation, RegularSeries};
use crate::error::{ForecastError, Result};

/// Time span the regular series should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeriesRange {
    /// From the earliest to the latest observation.
    #[default]
    FullSpan,
    /// A caller-supplied inclusive range, snapped inward to the grid.
    Explicit {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Pads, window-filters and fills observations into a [`RegularSeries`].
#[derive(Debug, Clone)]
pub struct SeriesRegularizer {
    interval: Duration,
    range: SeriesRange,
    window: HourWindow,
    fill_value: f64,
}

impl SeriesRegularizer {
    /// Create a regularizer over the full observed span, all hours, filling with zero.
    pub fn new(interval: Duration) -> Result<Self> {
        interval_seconds(interval)?;
        Ok(Self {
            interval,
            range: SeriesRange::FullSpan,
            window: HourWindow::full_day(),
            fill_value: 0.0,
        })
    }

    pub fn with_range(mut self, range: SeriesRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_window(mut self, window: HourWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn window(&self) -> HourWindow {
        self.window
    }

    /// Build the regular series.
    ///
    /// 1. Pad every grid slot of the range, leaving slots without an
    ///    observation unset.
    /// 2. Drop slots whose hour lies outside the window.
    /// 3. Replace unset (or NaN) values with the fill value.
    pub fn regularize(&self, observations: &[Observation]) -> Result<RegularSeries> {
        if !self.fill_value.is_finite() {
            return Err(ForecastError::InvalidParameter(format!(
                "fill value must be finite, got {}",
                self.fill_value
            )));
        }
        self.window.slots_per_day(self.interval)?;

        let mut slots: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
        for obs in observations {
            if align_down(obs.timestamp, self.interval)? != obs.timestamp {
                return Err(ForecastError::TimestampError(format!(
                    "observation at {} is not aligned to the {} grid",
                    obs.timestamp, self.interval
                )));
            }
            if slots.insert(obs.timestamp, obs.value).is_some() {
                return Err(ForecastError::TimestampError(format!(
                    "duplicate observation at {}",
                    obs.timestamp
                )));
            }
        }

        let (start, end) = self.bounds(&slots)?;

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let mut dropped_outside_window = 0usize;
        let mut filled = 0usize;
        let mut current = start;
        while current <= end {
            if self.window.contains(&current) {
                let value = match slots.get(&current) {
                    Some(v) if !v.is_nan() => *v,
                    _ => {
                        filled += 1;
                        self.fill_value
                    }
                };
                timestamps.push(current);
                values.push(value);
            } else if slots.contains_key(&current) {
                dropped_outside_window += 1;
            }
            current += self.interval;
        }

        if timestamps.is_empty() {
            return Err(ForecastError::EmptyRange(format!(
                "no slot between {start} and {end} lies within hours [{}, {}]",
                self.window.min_hour(),
                self.window.max_hour()
            )));
        }

        debug!(
            slots = timestamps.len(),
            filled,
            dropped_outside_window,
            "regularized series"
        );

        RegularSeries::new(timestamps, values, self.interval, self.window)
    }

    fn bounds(&self, slots: &BTreeMap<DateTime<Utc>, f64>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match self.range {
            SeriesRange::FullSpan => {
                match (slots.keys().next(), slots.keys().next_back()) {
                    (Some(first), Some(last)) => Ok((*first, *last)),
                    _ => Err(ForecastError::EmptyRange(
                        "no observations to span".to_string(),
                    )),
                }
            }
            SeriesRange::Explicit { start, end } => {
                let first = align_up(start, self.interval)?;
                let last = align_down(end, self.interval)?;
                if first > last {
                    return Err(ForecastError::EmptyRange(format!(
                        "range {start} to {end} contains no {} slot",
                        self.interval
                    )));
                }
                Ok((first, last))
            }
        }
    }
}
