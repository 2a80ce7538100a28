//! Property-based tests for breach analysis and flap counting.
//!
//! Key invariants:
//! - continuous <= cumulative <= present <= window length
//! - Flat series above the threshold breach for the whole window
//! - Alternating series give runs of one and ceil(L/2) breaching hours
//! - Flaps count status transitions between consecutive hours

use proptest::prelude::*;
use rollup_lib::{
    evaluate, HourKey, HourWindow, HourlySample, KpiCalculator, QualityStats, SeriesPoint,
};

fn base_hour() -> HourKey {
    "2024060100".parse().unwrap()
}

/// Strictly increasing hours with random gaps and absent points
fn series() -> impl Strategy<Value = Vec<SeriesPoint>> {
    prop::collection::vec((1i64..4, prop::option::of(0.0f64..100.0)), 0..80).prop_map(|steps| {
        let mut hour = base_hour();
        steps
            .into_iter()
            .map(|(step, value)| {
                hour = hour.offset(step);
                SeriesPoint { hour, value }
            })
            .collect()
    })
}

fn status_sample(hour: i64, up_minutes: i32) -> HourlySample {
    HourlySample {
        site_id: "site-a".into(),
        circuit_id: "dev:wan0".into(),
        hour: base_hour().offset(hour),
        rx_bytes: 0,
        tx_bytes: 0,
        bandwidth_bps: 1_000_000,
        up_minutes,
        quality: QualityStats::default(),
    }
}

proptest! {
    #[test]
    fn breach_counts_are_ordered(
        points in series(),
        threshold in 0.0f64..100.0,
        end in 0i64..250,
        len in 1u32..48,
    ) {
        let window = HourWindow::ending_at(base_hour().offset(end), len);
        let result = evaluate(&points, threshold, window).unwrap();
        prop_assert!(result.continuous_hours <= result.cumulative_hours);
        prop_assert!(result.cumulative_hours <= result.present_hours);
        prop_assert!(result.present_hours <= result.window_length());
        prop_assert_eq!(result.insufficient_data, result.present_hours == 0);
    }

    #[test]
    fn flat_series_breaches_whole_window(len in 1u32..48, excess in 0.001f64..50.0) {
        let threshold = 50.0;
        let points: Vec<_> = (0..len)
            .map(|i| SeriesPoint::present(base_hour().offset(i64::from(i)), threshold + excess))
            .collect();
        let window = HourWindow::ending_at(base_hour().offset(i64::from(len) - 1), len);
        let result = evaluate(&points, threshold, window).unwrap();
        prop_assert_eq!(result.continuous_hours, len);
        prop_assert_eq!(result.cumulative_hours, len);
    }

    #[test]
    fn alternating_series_breaches_every_other_hour(len in 1u32..48) {
        let points: Vec<_> = (0..len)
            .map(|i| {
                let value = if i % 2 == 0 { 90.0 } else { 10.0 };
                SeriesPoint::present(base_hour().offset(i64::from(i)), value)
            })
            .collect();
        let window = HourWindow::ending_at(base_hour().offset(i64::from(len) - 1), len);
        let result = evaluate(&points, 50.0, window).unwrap();
        prop_assert_eq!(result.continuous_hours, 1);
        prop_assert_eq!(result.cumulative_hours, len.div_ceil(2));
    }

    #[test]
    fn alternating_status_flaps_every_hour(len in 1i64..72) {
        let samples: Vec<_> = (0..len)
            .map(|h| status_sample(h, if h % 2 == 0 { 60 } else { 0 }))
            .collect();
        let series = KpiCalculator::new().derive_series(&samples).unwrap();
        prop_assert_eq!(series[0].flap_count(), (len - 1) as u64);
    }

    #[test]
    fn steady_status_never_flaps(len in 1i64..72, up_minutes in 0i32..=60) {
        let samples: Vec<_> = (0..len).map(|h| status_sample(h, up_minutes)).collect();
        let series = KpiCalculator::new().derive_series(&samples).unwrap();
        prop_assert_eq!(series[0].flap_count(), 0);
    }
}
