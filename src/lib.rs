//! # visitor-forecast
//!
//! Visitor traffic estimation and forecasting from irregular transaction logs.
//!
//! The crate turns timestamped purchase events into a gap-free series on a
//! business-hours grid, decomposes it into intraday and intraweek seasonal
//! cycles, scores competing forecasting models on a held-out tail window and
//! validates the residuals of the winner.
//!
//! ```no_run
//! use visitor_forecast::prelude::*;
//!
//! # fn events() -> Vec<RawEvent> { Vec::new() }
//! let config = PipelineConfig::default();
//! let report = Pipeline::new(config)?.run(&events())?;
//! println!("{} wins: {:?}", report.selected, report.forecast.point());
//! # Ok::<(), ForecastError>(())
//! ```

#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod error;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod seasonality;
pub mod transform;
pub mod utils;
pub mod validation;

pub use error::{ForecastError, Result, Stage};

pub mod prelude {
    pub use crate::core::{Forecast, HourWindow, RegularSeries};
    pub use crate::error::{ForecastError, Result, Stage};
    pub use crate::events::{AggregationStrategy, EventAggregator, Observation, RawEvent};
    pub use crate::models::{FittedModel, ModelVariant};
    pub use crate::pipeline::{select_best, Pipeline, PipelineConfig, PipelineReport, Seasonality};
    pub use crate::seasonality::{DecompositionMethod, DecompositionResult, SeasonalDecomposer};
    pub use crate::transform::{SeriesRange, SeriesRegularizer};
    pub use crate::utils::{AccuracyReport, CVReport, CrossValidator, VariantOutcome};
    pub use crate::validation::{DiagnosticResult, ResidualDiagnostics};
}
