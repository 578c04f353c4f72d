//! Property-based tests for the series-building and scoring stages.
//!
//! These tests verify invariants that should hold for all valid inputs,
//! using randomly generated events, observations and series.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use proptest::prelude::*;
use visitor_forecast::core::{HourWindow, RegularSeries};
use visitor_forecast::events::{AggregationStrategy, EventAggregator, Observation, RawEvent};
use visitor_forecast::models::ModelVariant;
use visitor_forecast::seasonality::{DecompositionMethod, SeasonalDecomposer};
use visitor_forecast::transform::SeriesRegularizer;
use visitor_forecast::utils::accuracy;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap()
}

fn business() -> HourWindow {
    HourWindow::new(10, 22).unwrap()
}

/// Sparse hourly observations over up to five days, any hour of day.
fn observations_strategy() -> impl Strategy<Value = Vec<Observation>> {
    prop::collection::btree_map(0i64..120, 0u32..40, 1..60).prop_map(|slots| {
        slots
            .into_iter()
            .map(|(h, v)| Observation::new(base() + Duration::hours(h), v as f64))
            .collect()
    })
}

/// Events spread over two days with a handful of transaction ids and categories.
fn events_strategy() -> impl Strategy<Value = Vec<RawEvent>> {
    prop::collection::vec((0i64..2 * 24 * 60, 0u32..12, 0usize..3), 1..80).prop_map(|raw| {
        raw.into_iter()
            .map(|(minute, id, cat)| {
                RawEvent::new(
                    base() + Duration::minutes(minute),
                    format!("T{id}"),
                    ["coffee", "Coffee ", "tea"][cat],
                )
            })
            .collect()
    })
}

/// One single-item transaction per occupied hour, always in the coffee
/// category but with varying case and padding.
fn single_item_log_strategy() -> impl Strategy<Value = Vec<RawEvent>> {
    prop::collection::btree_map(0i64..72, (0i64..60, 0usize..4), 1..40).prop_map(|hours| {
        hours
            .into_iter()
            .map(|(h, (minute, casing))| {
                RawEvent::new(
                    base() + Duration::hours(h) + Duration::minutes(minute),
                    format!("T{h}"),
                    ["coffee", "Coffee", " COFFEE", "coffee "][casing],
                )
            })
            .collect()
    })
}

fn session_series(values: Vec<f64>) -> RegularSeries {
    RegularSeries::from_values(
        base() + Duration::hours(10),
        Duration::hours(1),
        business(),
        values,
    )
    .unwrap()
}

/// Strategy for noisy series with a daily cycle of 13 slots.
fn seasonal_values_strategy(min_days: usize, max_days: usize) -> impl Strategy<Value = Vec<f64>> {
    (min_days..max_days).prop_flat_map(|days| {
        (
            20.0..80.0_f64,
            2.0..15.0_f64,
            prop::collection::vec(-1.0..1.0_f64, days * 13),
        )
            .prop_map(|(level, amplitude, noise)| {
                noise
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let phase = (i % 13) as f64 / 13.0;
                        level + amplitude * (std::f64::consts::TAU * phase).sin() + e
                    })
                    .collect()
            })
    })
}

// =============================================================================
// Regularization
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn regular_series_is_gap_free_inside_window(obs in observations_strategy()) {
        let regularizer = SeriesRegularizer::new(Duration::hours(1))
            .unwrap()
            .with_window(business());
        let in_window: Vec<&Observation> = obs
            .iter()
            .filter(|o| business().contains(&o.timestamp))
            .collect();

        match regularizer.regularize(&obs) {
            Ok(series) => {
                prop_assert!(series.timestamps().iter().all(|t| (10..=22).contains(&t.hour())));
                for pair in series.timestamps().windows(2) {
                    prop_assert_eq!(
                        business().next_slot(pair[0], Duration::hours(1)).unwrap(),
                        pair[1]
                    );
                }
                let values: BTreeMap<_, _> = series.iter().collect();
                for o in &in_window {
                    prop_assert_eq!(values.get(&o.timestamp).copied(), Some(o.value));
                }
                let observed: BTreeSet<_> = in_window.iter().map(|o| o.timestamp).collect();
                for (t, v) in series.iter() {
                    if !observed.contains(&t) {
                        prop_assert_eq!(v, 0.0);
                    }
                }
            }
            // Only possible when the whole span falls in closed hours.
            Err(_) => prop_assert!(in_window.is_empty()),
        }
    }

    #[test]
    fn regularization_is_idempotent(obs in observations_strategy()) {
        let regularizer = SeriesRegularizer::new(Duration::hours(1))
            .unwrap()
            .with_window(business());
        if let Ok(series) = regularizer.regularize(&obs) {
            let again = regularizer.regularize(&series.observations()).unwrap();
            prop_assert_eq!(again, series);
        }
    }
}

// =============================================================================
// Aggregation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn distinct_transactions_match_direct_count(events in events_strategy()) {
        let aggregator = EventAggregator::new(
            AggregationStrategy::DistinctTransactions,
            Duration::hours(1),
        )
        .unwrap();
        let observed = aggregator.aggregate(&events).unwrap();

        let mut expected: BTreeMap<DateTime<Utc>, BTreeSet<&str>> = BTreeMap::new();
        for e in &events {
            let bucket = e.timestamp.with_minute(0).unwrap().with_second(0).unwrap();
            expected.entry(bucket).or_default().insert(e.transaction_id.as_str());
        }
        let expected: Vec<Observation> = expected
            .into_iter()
            .map(|(t, ids)| Observation::new(t, ids.len() as f64))
            .collect();
        prop_assert_eq!(observed, expected);
    }

    #[test]
    fn strategies_agree_on_single_item_transactions(events in single_item_log_strategy().prop_shuffle()) {
        let distinct = EventAggregator::new(AggregationStrategy::DistinctTransactions, Duration::hours(1))
            .unwrap()
            .aggregate(&events)
            .unwrap();
        let items = EventAggregator::new(
            AggregationStrategy::ItemCountPerCategory { category: "Coffee".into() },
            Duration::hours(1),
        )
        .unwrap()
        .aggregate(&events)
        .unwrap();

        prop_assert_eq!(distinct.len(), events.len());
        prop_assert_eq!(distinct, items);
    }

    #[test]
    fn aggregation_ignores_event_order(events in events_strategy().prop_shuffle()) {
        let strategy = AggregationStrategy::ItemCountPerCategory { category: "coffee".into() };
        let aggregator = EventAggregator::new(strategy, Duration::minutes(30)).unwrap();

        let mut sorted = events.clone();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.transaction_id.cmp(&b.transaction_id)));
        prop_assert_eq!(aggregator.aggregate(&events).unwrap(), aggregator.aggregate(&sorted).unwrap());

        let total: f64 = aggregator.aggregate(&events).unwrap().iter().map(|o| o.value).sum();
        let matching = events.iter().filter(|e| e.item_category.trim().eq_ignore_ascii_case("coffee")).count();
        prop_assert_eq!(total, matching as f64);
    }
}

// =============================================================================
// Decomposition and models
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn decomposition_reconstructs_series(values in seasonal_values_strategy(3, 8)) {
        let series = session_series(values.clone());
        for method in [DecompositionMethod::Classical, DecompositionMethod::Loess] {
            let result = SeasonalDecomposer::new(vec![13])
                .unwrap()
                .with_method(method)
                .decompose(&series)
                .unwrap();
            for (r, v) in result.reconstruct().iter().zip(&values) {
                prop_assert!((r - v).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn stl_ets_forecasts_are_finite_on_the_grid(
        values in seasonal_values_strategy(3, 6),
        horizon in 1usize..30
    ) {
        let series = session_series(values);
        let fitted = ModelVariant::stl_ets().fit(&series, &[13]).unwrap();
        let forecast = fitted.forecast_with_intervals(horizon, 0.9).unwrap();
        prop_assert_eq!(forecast.horizon(), horizon);
        prop_assert!(forecast.point().iter().all(|v| v.is_finite()));
        prop_assert!(forecast.timestamps()[0] > series.end());
        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();
        for i in 0..horizon {
            prop_assert!(lower[i] <= forecast.point()[i] && forecast.point()[i] <= upper[i]);
        }
    }
}

// =============================================================================
// Accuracy
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn accuracy_is_deterministic_and_bounded(
        pairs in prop::collection::vec((0.0..100.0_f64, 0.0..100.0_f64), 1..50)
    ) {
        let (actual, forecast): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let a = accuracy("m", &actual, &forecast, Some(2.0)).unwrap();
        let b = accuracy("m", &actual, &forecast, Some(2.0)).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(a.rmse + 1e-12 >= a.mae);
        prop_assert!(a.mae + 1e-12 >= a.me.abs());
        prop_assert!((0.0..=200.0 + 1e-9).contains(&a.smape));
        prop_assert!((a.mase.unwrap() - a.mae / 2.0).abs() < 1e-12);

        let perfect = accuracy("m", &actual, &actual, None).unwrap();
        prop_assert_eq!(perfect.rmse, 0.0);
    }
}
