//! Error types for the visitor-forecast library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Aggregate,
    Regularize,
    Decompose,
    CrossValidate,
    Refit,
    Forecast,
    Diagnose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Aggregate => "aggregate",
            Stage::Regularize => "regularize",
            Stage::Decompose => "decompose",
            Stage::CrossValidate => "cross-validate",
            Stage::Refit => "refit",
            Stage::Forecast => "forecast",
            Stage::Diagnose => "diagnose",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building, decomposing or forecasting a series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// A requested range produced zero buckets.
    #[error("empty range: {0}")]
    EmptyRange(String),

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A declared seasonal period is not shorter than the series.
    #[error("insufficient data: seasonal period {period} needs more than {len} observations")]
    PeriodExceedsSeries { period: usize, len: usize },

    /// The holdout window leaves too little training data for a variant.
    #[error(
        "insufficient history for {variant}: holdout {holdout} of {len} observations \
         leaves less than the {required} required for training"
    )]
    InsufficientHistory {
        variant: String,
        holdout: usize,
        len: usize,
        required: usize,
    },

    /// Model estimation failed.
    #[error("model fit failed for {variant}: {reason}")]
    ModelFit { variant: String, reason: String },

    /// Every evaluated variant failed to fit.
    #[error("all model variants failed: {}", .0.join("; "))]
    AllVariantsFailed(Vec<String>),

    /// Residual diagnostics are undefined for the given residuals.
    #[error("diagnostic input: {0}")]
    DiagnosticInput(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Missing values detected when not allowed.
    #[error("missing values detected in data")]
    MissingValues,

    /// Index out of bounds.
    #[error("index out of bounds: {index} (size: {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// An error annotated with the pipeline stage that raised it.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ForecastError>,
    },
}

impl ForecastError {
    /// Shorthand for a [`ForecastError::ModelFit`].
    pub fn model_fit(variant: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::ModelFit {
            variant: variant.into(),
            reason: reason.into(),
        }
    }

    /// Attach the pipeline stage to this error. Already-staged errors are kept as is.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            staged @ ForecastError::Stage { .. } => staged,
            other => ForecastError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The error with any stage annotation removed.
    pub fn root(&self) -> &ForecastError {
        match self {
            ForecastError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a model fit failure, looking through stage annotations.
    pub fn is_model_fit(&self) -> bool {
        matches!(self.root(), ForecastError::ModelFit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientData { needed: 10, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 10, got 5"
        );

        let err = ForecastError::PeriodExceedsSeries { period: 91, len: 40 };
        assert_eq!(
            err.to_string(),
            "insufficient data: seasonal period 91 needs more than 40 observations"
        );

        let err = ForecastError::model_fit("HoltWinters", "zero variance");
        assert_eq!(
            err.to_string(),
            "model fit failed for HoltWinters: zero variance"
        );

        let err = ForecastError::AllVariantsFailed(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "all model variants failed: a; b");
    }

    #[test]
    fn insufficient_history_names_variant() {
        let err = ForecastError::InsufficientHistory {
            variant: "STL+ETS".to_string(),
            holdout: 30,
            len: 20,
            required: 26,
        };
        let msg = err.to_string();
        assert!(msg.contains("STL+ETS"));
        assert!(msg.contains("holdout 30"));
    }

    #[test]
    fn stage_wraps_once() {
        let err = ForecastError::EmptyRange("no slots".to_string())
            .in_stage(Stage::Regularize)
            .in_stage(Stage::Decompose);

        match &err {
            ForecastError::Stage { stage, .. } => assert_eq!(*stage, Stage::Regularize),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "regularize stage failed: empty range: no slots"
        );
        assert_eq!(err.root(), &ForecastError::EmptyRange("no slots".to_string()));
    }

    #[test]
    fn model_fit_detected_through_stage() {
        let err = ForecastError::model_fit("x", "y").in_stage(Stage::Refit);
        assert!(err.is_model_fit());
        assert!(!ForecastError::EmptyData.is_model_fit());
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::EmptyData.in_stage(Stage::Aggregate);
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
