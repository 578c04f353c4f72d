//! Bucketed visitor estimates from raw transaction events.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RawEvent;
use crate::core::calendar::{align_down, interval_seconds};
use crate::core::Observation;
use crate::error::Result;

/// How visitors are estimated from the events in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// One visitor per distinct transaction id.
    #[default]
    DistinctTransactions,
    /// One visitor per item of the designated category.
    ItemCountPerCategory { category: String },
}

impl AggregationStrategy {
    /// Short label used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            AggregationStrategy::DistinctTransactions => "distinct_transactions".to_string(),
            AggregationStrategy::ItemCountPerCategory { category } => {
                format!("item_count[{}]", category.trim())
            }
        }
    }
}

/// Groups raw events into fixed buckets and estimates visitors per bucket.
#[derive(Debug, Clone)]
pub struct EventAggregator {
    strategy: AggregationStrategy,
    bucket: Duration,
}

impl EventAggregator {
    /// Create an aggregator. The bucket must divide a day evenly.
    pub fn new(strategy: AggregationStrategy, bucket: Duration) -> Result<Self> {
        interval_seconds(bucket)?;
        Ok(Self { strategy, bucket })
    }

    pub fn strategy(&self) -> &AggregationStrategy {
        &self.strategy
    }

    pub fn bucket(&self) -> Duration {
        self.bucket
    }

    /// Aggregate events into `(bucket start, count)` observations.
    ///
    /// Buckets without a qualifying event are absent. Output is in ascending
    /// bucket order regardless of input order.
    pub fn aggregate(&self, events: &[RawEvent]) -> Result<Vec<Observation>> {
        let counts = match &self.strategy {
            AggregationStrategy::DistinctTransactions => self.distinct_transactions(events)?,
            AggregationStrategy::ItemCountPerCategory { category } => {
                self.item_count(events, category)?
            }
        };

        debug!(
            strategy = %self.strategy.label(),
            events = events.len(),
            buckets = counts.len(),
            "aggregated events"
        );

        Ok(counts
            .into_iter()
            .map(|(timestamp, count)| Observation::new(timestamp, count as f64))
            .collect())
    }

    fn distinct_transactions(&self, events: &[RawEvent]) -> Result<BTreeMap<DateTime<Utc>, usize>> {
        let mut groups: BTreeMap<DateTime<Utc>, BTreeSet<&str>> = BTreeMap::new();
        for event in events {
            let bucket = align_down(event.timestamp, self.bucket)?;
            groups
                .entry(bucket)
                .or_default()
                .insert(event.transaction_id.as_str());
        }
        Ok(groups
            .into_iter()
            .map(|(bucket, ids)| (bucket, ids.len()))
            .collect())
    }

    fn item_count(
        &self,
        events: &[RawEvent],
        category: &str,
    ) -> Result<BTreeMap<DateTime<Utc>, usize>> {
        let wanted = category.trim();
        let mut counts: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
        for event in events
            .iter()
            .filter(|e| e.item_category.trim().eq_ignore_ascii_case(wanted))
        {
            *counts.entry(align_down(event.timestamp, self.bucket)?).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    fn sample_events() -> Vec<RawEvent> {
        vec![
            RawEvent::new(at(9, 59), "tx1", "food"),
            RawEvent::new(at(10, 5), "tx1", "food"),
            RawEvent::new(at(10, 40), "tx2", "food"),
            RawEvent::new(at(11, 10), "tx3", "drink"),
        ]
    }

    fn value_at(obs: &[Observation], ts: DateTime<Utc>) -> Option<f64> {
        obs.iter().find(|o| o.timestamp == ts).map(|o| o.value)
    }

    #[test]
    fn distinct_transactions_per_bucket() {
        let agg =
            EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::hours(1))
                .unwrap();
        let obs = agg.aggregate(&sample_events()).unwrap();

        assert_eq!(obs.len(), 3);
        assert_relative_eq!(value_at(&obs, at(9, 0)).unwrap(), 1.0);
        assert_relative_eq!(value_at(&obs, at(10, 0)).unwrap(), 2.0);
        assert_relative_eq!(value_at(&obs, at(11, 0)).unwrap(), 1.0);
    }

    #[test]
    fn item_count_counts_designated_category() {
        let strategy = AggregationStrategy::ItemCountPerCategory {
            category: "Food".to_string(),
        };
        let agg = EventAggregator::new(strategy, Duration::hours(1)).unwrap();
        let obs = agg.aggregate(&sample_events()).unwrap();

        // The drink-only bucket at 11:00 is absent.
        assert_eq!(obs.len(), 2);
        assert_relative_eq!(value_at(&obs, at(9, 0)).unwrap(), 1.0);
        assert_relative_eq!(value_at(&obs, at(10, 0)).unwrap(), 2.0);
        assert!(value_at(&obs, at(11, 0)).is_none());
    }

    #[test]
    fn item_count_counts_items_not_transactions() {
        let events = vec![
            RawEvent::new(at(12, 1), "tx9", "food"),
            RawEvent::new(at(12, 2), "tx9", "food"),
            RawEvent::new(at(12, 3), "tx9", "food"),
        ];
        let strategy = AggregationStrategy::ItemCountPerCategory {
            category: "food".to_string(),
        };
        let obs = EventAggregator::new(strategy, Duration::hours(1))
            .unwrap()
            .aggregate(&events)
            .unwrap();
        assert_relative_eq!(obs[0].value, 3.0);

        let obs = EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::hours(1))
            .unwrap()
            .aggregate(&events)
            .unwrap();
        assert_relative_eq!(obs[0].value, 1.0);
    }

    #[test]
    fn item_count_ignores_event_order() {
        let strategy = AggregationStrategy::ItemCountPerCategory {
            category: "food".to_string(),
        };
        let agg = EventAggregator::new(strategy, Duration::hours(1)).unwrap();
        let mut events = sample_events();
        events.push(RawEvent::new(at(10, 59), "tx4", " FOOD"));
        let forward = agg.aggregate(&events).unwrap();
        events.reverse();
        let backward = agg.aggregate(&events).unwrap();

        assert_eq!(forward, backward);
        assert_relative_eq!(value_at(&forward, at(10, 0)).unwrap(), 3.0);
    }

    #[test]
    fn output_is_chronological_for_unsorted_input() {
        let mut events = sample_events();
        events.reverse();
        let obs = EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::hours(1))
            .unwrap()
            .aggregate(&events)
            .unwrap();
        for pair in obs.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn empty_input_gives_no_buckets() {
        let obs = EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::hours(1))
            .unwrap()
            .aggregate(&[])
            .unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn bucket_must_divide_day() {
        assert!(
            EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::minutes(7))
                .is_err()
        );
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(
            AggregationStrategy::DistinctTransactions.label(),
            "distinct_transactions"
        );
        let s = AggregationStrategy::ItemCountPerCategory {
            category: " food ".to_string(),
        };
        assert_eq!(s.label(), "item_count[food]");
    }
}
