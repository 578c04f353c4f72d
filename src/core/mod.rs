//! Core data structures: the business-hours calendar, regular series and forecasts.

pub mod calendar;
mod forecast;
mod time_series;

pub use calendar::HourWindow;
pub use forecast::Forecast;
pub use time_series::{Observation, RegularSeries};
