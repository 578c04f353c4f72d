//! Transformations from sparse observations to regular series.

mod regularize;

pub use regularize::{SeriesRange, SeriesRegularizer};
