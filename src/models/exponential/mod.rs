//! Exponential smoothing models.
//!
//! - Holt-Winters with additive seasonality
//! - Non-seasonal ETS (error-trend) state space models with AICc selection

mod ets;
mod holt_winters;

pub use ets::{Ets, EtsFit, TrendType};
pub use holt_winters::{HoltWinters, HoltWintersFit};
