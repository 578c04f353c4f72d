//! ARIMA (Autoregressive Integrated Moving Average) models.

mod diff;
mod model;

pub use diff::{difference, differencing_polynomial, integrate};
pub use model::{Arima, ArimaFit, ArimaOrder};
