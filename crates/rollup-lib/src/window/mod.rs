//! Rolling operational windows
//!
//! Snapshots of the last 3, 12 or 24 hours ending at a reference hour.
//! Utilization and availability come from summed raw quantities of the
//! hours present in the window, alongside the average, max and exact p95 of
//! the hourly utilization values. Breach durations come from the threshold
//! evaluator for every metric and tier.

use crate::calendar::{AggregateMetrics, RollupTotals};
use crate::error::{Result, RollupError};
use crate::kpi::CircuitSeries;
use crate::models::{HourKey, Metric};
use crate::threshold::{
    HourWindow, SeriesPoint, Severity, ThresholdConfig, ThresholdEvaluator, ThresholdTier,
    ThresholdWindowResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Supported window lengths in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum WindowSize {
    Three,
    Twelve,
    TwentyFour,
}

impl WindowSize {
    pub const ALL: [WindowSize; 3] = [WindowSize::Three, WindowSize::Twelve, WindowSize::TwentyFour];

    pub fn hours(&self) -> u32 {
        match self {
            WindowSize::Three => 3,
            WindowSize::Twelve => 12,
            WindowSize::TwentyFour => 24,
        }
    }
}

impl TryFrom<u32> for WindowSize {
    type Error = String;

    fn try_from(hours: u32) -> std::result::Result<Self, Self::Error> {
        match hours {
            3 => Ok(WindowSize::Three),
            12 => Ok(WindowSize::Twelve),
            24 => Ok(WindowSize::TwentyFour),
            other => Err(format!("unsupported window size {other}h, expected 3, 12 or 24")),
        }
    }
}

impl From<WindowSize> for u32 {
    fn from(size: WindowSize) -> Self {
        size.hours()
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.hours())
    }
}

/// Breach analysis of one metric against one tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBreach {
    pub metric: Metric,
    pub tier: ThresholdTier,
    pub result: ThresholdWindowResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub site_id: String,
    pub circuit_id: String,
    pub size: WindowSize,
    pub window: HourWindow,
    pub totals: RollupTotals,
    pub metrics: AggregateMetrics,
    /// No hour of the window was present
    pub insufficient_data: bool,
    pub breaches: Vec<TierBreach>,
}

impl WindowSnapshot {
    pub fn breach(&self, metric: Metric, tier: ThresholdTier) -> Option<&ThresholdWindowResult> {
        self.breaches
            .iter()
            .find(|b| b.metric == metric && b.tier == tier)
            .map(|b| &b.result)
    }

    /// Highest tier breached by any metric during the window
    pub fn worst_severity(&self) -> Severity {
        if self.insufficient_data {
            return Severity::Unknown;
        }
        self.breaches
            .iter()
            .filter(|b| b.result.breached())
            .map(|b| Severity::from(b.tier))
            .max()
            .unwrap_or(Severity::Normal)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RollingWindowAggregator;

impl RollingWindowAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot of `size` hours ending at `reference_hour`
    pub fn compute_window(
        &self,
        series: &CircuitSeries,
        reference_hour: HourKey,
        size: WindowSize,
        thresholds: &ThresholdConfig,
    ) -> Result<WindowSnapshot> {
        let window = HourWindow::ending_at(reference_hour, size.hours());
        let records = &series.records;

        for pair in records.windows(2) {
            if pair[1].hour <= pair[0].hour {
                return Err(RollupError::UnorderedSeries {
                    previous: pair[0].hour,
                    current: pair[1].hour,
                });
            }
        }

        let first = records.partition_point(|r| r.hour < window.start);
        let last = records.partition_point(|r| r.hour <= window.end);
        let in_window = &records[first..last];

        let totals = RollupTotals::from_records(in_window, &thresholds.utilization);
        let insufficient_data = totals.is_empty();

        let mut breaches = Vec::with_capacity(Metric::ALL.len() * ThresholdTier::ALL.len());
        for metric in Metric::ALL {
            let points: Vec<SeriesPoint> = in_window
                .iter()
                .map(|r| SeriesPoint {
                    hour: r.hour,
                    value: r.metric_value(metric),
                })
                .collect();
            for (tier, threshold) in thresholds.tiers(metric).tiers() {
                let result = ThresholdEvaluator::new(threshold).evaluate(&points, window)?;
                breaches.push(TierBreach { metric, tier, result });
            }
        }

        debug!(
            circuit = %series.key,
            window = %size,
            reference_hour = %reference_hour,
            present_hours = totals.hours,
            "Computed window snapshot"
        );

        Ok(WindowSnapshot {
            site_id: series.key.site_id.clone(),
            circuit_id: series.key.circuit_id.clone(),
            size,
            window,
            metrics: AggregateMetrics::from(&totals),
            totals,
            insufficient_data,
            breaches,
        })
    }

    /// 3h, 12h and 24h snapshots ending at `reference_hour`
    pub fn compute_all_windows(
        &self,
        series: &CircuitSeries,
        reference_hour: HourKey,
        thresholds: &ThresholdConfig,
    ) -> Result<Vec<WindowSnapshot>> {
        WindowSize::ALL
            .iter()
            .map(|size| self.compute_window(series, reference_hour, *size, thresholds))
            .collect()
    }
}
