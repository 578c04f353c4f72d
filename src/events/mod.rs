//! Raw transaction events and their aggregation into visitor counts.

mod aggregate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::core::Observation;
pub use aggregate::{AggregationStrategy, EventAggregator};

/// One purchased item as recorded by the point of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp: DateTime<Utc>,
    pub transaction_id: String,
    pub item_category: String,
}

impl RawEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        transaction_id: impl Into<String>,
        item_category: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            transaction_id: transaction_id.into(),
            item_category: item_category.into(),
        }
    }
}
