// Property-Based Testing
// Reducer bounds, hint identity and backoff growth over generated inputs

use index_perf::pure::{backoff_delay, reduce};
use index_perf::IndexHint;
use proptest::prelude::*;

mod strategies {
    use super::*;

    // Realistic query latencies in seconds
    pub fn timings(min_len: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0.000_001f64..5.0, min_len..200)
    }

    // Distinct field names with a direction each
    pub fn hint_pairs() -> impl Strategy<Value = Vec<(String, i32)>> {
        prop::collection::btree_map("[a-z]{1,8}", prop_oneof![Just(1), Just(-1)], 0..6)
            .prop_map(|map| map.into_iter().collect())
    }
}

proptest! {
    #[test]
    fn prop_average_within_min_and_max(times in strategies::timings(1)) {
        let summary = reduce(&times, &[], &[], &[]).unwrap();
        prop_assert!(summary.min <= summary.avg);
        prop_assert!(summary.avg <= summary.max);
        prop_assert!(summary.stdev >= 0.0);
    }

    #[test]
    fn prop_percentiles_ordered_and_bounded(times in strategies::timings(5)) {
        let summary = reduce(&times, &[], &[], &[]).unwrap();
        prop_assert!(summary.min <= summary.percentile_95);
        prop_assert!(summary.percentile_95 <= summary.percentile_99);
        prop_assert!(summary.percentile_99 <= summary.max);
    }

    #[test]
    fn prop_short_series_have_zero_percentiles(times in prop::collection::vec(0.001f64..1.0, 1..5)) {
        let summary = reduce(&times, &[], &[], &[]).unwrap();
        prop_assert_eq!(summary.percentile_95, 0.0);
        prop_assert_eq!(summary.percentile_99, 0.0);
    }

    #[test]
    fn prop_reduce_ignores_input_order(mut times in strategies::timings(1)) {
        let forward = reduce(&times, &[], &[], &[]).unwrap();
        times.reverse();
        let backward = reduce(&times, &[], &[], &[]).unwrap();
        prop_assert_eq!(forward.min, backward.min);
        prop_assert_eq!(forward.max, backward.max);
        prop_assert_eq!(forward.percentile_95, backward.percentile_95);
        prop_assert_eq!(forward.percentile_99, backward.percentile_99);
        prop_assert!((forward.avg - backward.avg).abs() < 1e-12);
    }

    #[test]
    fn prop_hint_identity_ignores_key_order(pairs in strategies::hint_pairs()) {
        let forward = IndexHint::from_pairs(pairs.clone()).unwrap();
        let mut reversed_pairs = pairs;
        reversed_pairs.reverse();
        let reversed = IndexHint::from_pairs(reversed_pairs).unwrap();

        prop_assert_eq!(forward.canonical_key(), reversed.canonical_key());
        prop_assert_eq!(&forward, &reversed);
    }

    #[test]
    fn prop_backoff_grows_with_attempt(base in 1.0f64..4.0, attempt in 0u32..6) {
        let current = backoff_delay(base, attempt);
        let next = backoff_delay(base, attempt + 1);
        prop_assert!(next >= current);
        prop_assert!((current.as_secs_f64() - base.powi(attempt as i32)).abs() < 1e-6);
    }
}
