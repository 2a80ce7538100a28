//! Threshold breach evaluation
//!
//! Scans a time-ordered per-hour series once and reports the longest
//! continuous run of breaching hours and the cumulative breaching hours
//! inside a window. A missing hour, or a point marked absent, ends the
//! current run without counting as a breach.

use crate::error::{Result, RollupError};
use crate::models::HourKey;
use serde::{Deserialize, Serialize};

/// Inclusive range of hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: HourKey,
    pub end: HourKey,
}

impl HourWindow {
    /// Window of `hours` hours whose last hour is `reference`
    pub fn ending_at(reference: HourKey, hours: u32) -> Self {
        let span = i64::from(hours.max(1)) - 1;
        Self {
            start: reference.offset(-span),
            end: reference,
        }
    }

    /// Number of calendar hours in the window
    pub fn len(&self) -> u32 {
        (self.end.hours_since(self.start) + 1).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, hour: HourKey) -> bool {
        self.start <= hour && hour <= self.end
    }
}

/// One hour of a series; `value == None` marks an absent sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub hour: HourKey,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn present(hour: HourKey, value: f64) -> Self {
        Self {
            hour,
            value: Some(value),
        }
    }

    pub fn absent(hour: HourKey) -> Self {
        Self { hour, value: None }
    }
}

/// Breach metrics for one threshold over one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdWindowResult {
    pub window: HourWindow,
    pub threshold: f64,
    /// Longest run of consecutive breaching hours
    pub continuous_hours: u32,
    /// Total breaching hours
    pub cumulative_hours: u32,
    /// Hours in the window with a present value
    pub present_hours: u32,
    pub insufficient_data: bool,
}

impl ThresholdWindowResult {
    fn empty(window: HourWindow, threshold: f64) -> Self {
        Self {
            window,
            threshold,
            continuous_hours: 0,
            cumulative_hours: 0,
            present_hours: 0,
            insufficient_data: true,
        }
    }

    pub fn window_length(&self) -> u32 {
        self.window.len()
    }

    pub fn breached(&self) -> bool {
        self.cumulative_hours > 0
    }
}

/// Evaluates a strict greater-than threshold over hourly series
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEvaluator {
    pub threshold: f64,
}

impl ThresholdEvaluator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate `series` inside `window`
    ///
    /// # Arguments
    /// * `series` - points with strictly increasing hours; gaps are allowed
    /// * `window` - inclusive window; points outside it are ignored
    ///
    /// # Returns
    /// * `Err(UnorderedSeries)` if hours are not strictly increasing
    pub fn evaluate(&self, series: &[SeriesPoint], window: HourWindow) -> Result<ThresholdWindowResult> {
        let mut result = ThresholdWindowResult::empty(window, self.threshold);
        let mut previous: Option<HourKey> = None;
        let mut last_in_window: Option<HourKey> = None;
        let mut current_run = 0u32;

        for point in series {
            if let Some(previous) = previous {
                if point.hour <= previous {
                    return Err(RollupError::UnorderedSeries {
                        previous,
                        current: point.hour,
                    });
                }
            }
            previous = Some(point.hour);

            if !window.contains(point.hour) {
                continue;
            }

            // A skipped hour is a boundary
            if let Some(last) = last_in_window {
                if point.hour.hours_since(last) != 1 {
                    current_run = 0;
                }
            }
            last_in_window = Some(point.hour);

            match point.value {
                None => current_run = 0,
                Some(value) => {
                    result.present_hours += 1;
                    if value > self.threshold {
                        current_run += 1;
                        result.cumulative_hours += 1;
                        result.continuous_hours = result.continuous_hours.max(current_run);
                    } else {
                        current_run = 0;
                    }
                }
            }
        }

        result.insufficient_data = result.present_hours == 0;
        Ok(result)
    }
}

/// Evaluate `series` against `threshold` inside `window`
pub fn evaluate(series: &[SeriesPoint], threshold: f64, window: HourWindow) -> Result<ThresholdWindowResult> {
    ThresholdEvaluator::new(threshold).evaluate(series, window)
}
