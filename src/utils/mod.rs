//! Statistics, optimization, accuracy metrics and holdout evaluation.

pub mod cross_validation;
pub mod metrics;
pub mod optimization;
pub mod stats;

pub use cross_validation::{CVReport, CrossValidator, VariantOutcome};
pub use metrics::{accuracy, mase_scale, AccuracyReport};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};
pub use stats::quantile_normal;
