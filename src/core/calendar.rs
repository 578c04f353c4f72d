//! Business-hours calendar: the session grid a regular series lives on.

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Inclusive window of integer hours-of-day during which the business is open.
///
/// A timestamp belongs to the window when its hour component lies in
/// `[min_hour, max_hour]`; minutes and seconds are not considered, so with a
/// 30 minute interval and a `[10, 22]` window the slot `22:30` is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HourWindowDef", into = "HourWindowDef")]
pub struct HourWindow {
    min_hour: u32,
    max_hour: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct HourWindowDef {
    min_hour: u32,
    max_hour: u32,
}

impl TryFrom<HourWindowDef> for HourWindow {
    type Error = ForecastError;

    fn try_from(def: HourWindowDef) -> Result<Self> {
        HourWindow::new(def.min_hour, def.max_hour)
    }
}

impl From<HourWindow> for HourWindowDef {
    fn from(window: HourWindow) -> Self {
        HourWindowDef {
            min_hour: window.min_hour,
            max_hour: window.max_hour,
        }
    }
}

impl Default for HourWindow {
    fn default() -> Self {
        Self::full_day()
    }
}

impl HourWindow {
    /// Create a window covering `[min_hour, max_hour]`.
    pub fn new(min_hour: u32, max_hour: u32) -> Result<Self> {
        if max_hour > 23 {
            return Err(ForecastError::InvalidParameter(format!(
                "hour window upper bound {max_hour} is not an hour of day"
            )));
        }
        if min_hour > max_hour {
            return Err(ForecastError::InvalidParameter(format!(
                "hour window [{min_hour}, {max_hour}] is empty"
            )));
        }
        Ok(Self { min_hour, max_hour })
    }

    /// The window that admits every hour.
    pub fn full_day() -> Self {
        Self {
            min_hour: 0,
            max_hour: 23,
        }
    }

    /// Trading hours `[10, 22]`: thirteen hourly slots per day.
    pub fn business_hours() -> Self {
        Self {
            min_hour: 10,
            max_hour: 22,
        }
    }

    pub fn min_hour(&self) -> u32 {
        self.min_hour
    }

    pub fn max_hour(&self) -> u32 {
        self.max_hour
    }

    /// Whether the hour of `timestamp` falls inside the window.
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let hour = timestamp.hour();
        hour >= self.min_hour && hour <= self.max_hour
    }

    /// Number of grid slots per day that fall inside the window.
    ///
    /// With an hourly interval and a `[10, 22]` window this is 13, the daily
    /// seasonal period of the resulting series.
    pub fn slots_per_day(&self, interval: Duration) -> Result<usize> {
        let step = interval_seconds(interval)?;
        let slots = (0..SECONDS_PER_DAY / step)
            .filter(|k| {
                let hour = ((k * step) / 3600) as u32;
                hour >= self.min_hour && hour <= self.max_hour
            })
            .count();

        if slots == 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "hour window [{}, {}] admits no slot at a {}s interval",
                self.min_hour, self.max_hour, step
            )));
        }
        Ok(slots)
    }

    /// The next slot after `timestamp` that lies inside the window.
    ///
    /// Steps by `interval`, skipping closed hours. `timestamp` is expected to
    /// be on the grid.
    pub fn next_slot(&self, timestamp: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>> {
        let step = interval_seconds(interval)?;
        let mut candidate = timestamp;
        for _ in 0..SECONDS_PER_DAY / step {
            candidate += interval;
            if self.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ForecastError::InvalidParameter(format!(
            "hour window [{}, {}] admits no slot at a {}s interval",
            self.min_hour, self.max_hour, step
        )))
    }
}

/// Validate an aggregation interval and return its length in seconds.
///
/// The interval must be positive and divide a day evenly so that grid slots
/// line up with hour-of-day boundaries.
pub fn interval_seconds(interval: Duration) -> Result<i64> {
    let step = interval.num_seconds();
    if step <= 0 || interval != Duration::seconds(step) {
        return Err(ForecastError::InvalidParameter(format!(
            "interval must be a positive whole number of seconds, got {interval}"
        )));
    }
    if SECONDS_PER_DAY % step != 0 {
        return Err(ForecastError::InvalidParameter(format!(
            "interval of {step}s does not divide a day evenly"
        )));
    }
    Ok(step)
}

/// Truncate `timestamp` down to the start of its grid slot.
pub fn align_down(timestamp: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>> {
    timestamp
        .duration_trunc(interval)
        .map_err(|e| ForecastError::TimestampError(format!("cannot align {timestamp}: {e}")))
}

/// Round `timestamp` up to the next grid slot boundary (identity on the grid).
pub fn align_up(timestamp: DateTime<Utc>, interval: Duration) -> Result<DateTime<Utc>> {
    let down = align_down(timestamp, interval)?;
    Ok(if down < timestamp { down + interval } else { down })
}
