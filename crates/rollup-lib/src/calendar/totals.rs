//! Mergeable rollup totals and the metrics derived from them
//!
//! Totals only hold integer sums and max-reductions. Metric averages are
//! summed in fixed-point pico-units so that merging is exact; every ratio is
//! recomputed from the merged sums.

use crate::kpi::{period_availability_pct, utilization_from_totals};
use crate::merge::Merge;
use crate::models::{HourlyKpiRecord, Metric, MetricStats, MAX_QUALITY_VALUE, MINUTES_PER_HOUR};
use crate::threshold::{ThresholdTier, TierThresholds};
use serde::{Deserialize, Serialize};

/// Scale of the fixed-point average sums
pub const AVG_SCALE: f64 = 1_000_000_000_000.0;

/// Hours above each utilization tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub warn: u64,
    pub high: u64,
    pub critical: u64,
}

impl TierCounts {
    pub fn get(&self, tier: ThresholdTier) -> u64 {
        match tier {
            ThresholdTier::Warn => self.warn,
            ThresholdTier::High => self.high,
            ThresholdTier::Critical => self.critical,
        }
    }

    fn from_value(value: f64, tiers: &TierThresholds) -> Self {
        Self {
            warn: u64::from(value > tiers.warn),
            high: u64::from(value > tiers.high),
            critical: u64::from(value > tiers.critical),
        }
    }
}

impl Merge for TierCounts {
    fn merge(&mut self, other: Self) {
        self.warn += other.warn;
        self.high += other.high;
        self.critical += other.critical;
    }
}

/// Percentile of `values` with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (sorted.len() - 1) as f64 * pct.clamp(0.0, 100.0) / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Values outside `[0, MAX_QUALITY_VALUE]` never reach the fixed-point sum
fn to_fixed_point(value: f64) -> i128 {
    (value.clamp(0.0, MAX_QUALITY_VALUE) * AVG_SCALE).round() as i128
}

/// Recombinable statistics of one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAccumulator {
    /// Hours that reported the metric
    pub samples: u64,
    /// Sum of hourly averages in pico-units
    pub avg_sum_pico: i128,
    pub max: Option<f64>,
    pub p95_max: Option<f64>,
    /// Number of p95 values folded into `p95_max`
    pub p95_sources: u64,
}

impl MetricAccumulator {
    pub fn from_stats(stats: Option<&MetricStats>) -> Self {
        match stats {
            None => Self::default(),
            Some(stats) => Self {
                samples: 1,
                avg_sum_pico: to_fixed_point(stats.avg),
                max: Some(stats.max),
                p95_max: Some(stats.p95),
                p95_sources: 1,
            },
        }
    }

    /// Statistics of hourly values with a single exact p95
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            samples: values.len() as u64,
            avg_sum_pico: values.iter().map(|v| to_fixed_point(*v)).sum(),
            max: values.iter().copied().reduce(f64::max),
            p95_max: percentile(values, 95.0),
            p95_sources: 1,
        }
    }

    pub fn summary(&self) -> MetricSummary {
        let avg = (self.samples > 0)
            .then(|| self.avg_sum_pico as f64 / AVG_SCALE / self.samples as f64);
        MetricSummary {
            avg,
            max: self.max,
            p95: self.p95_max,
            p95_approximate: self.p95_sources > 1,
            samples: self.samples,
        }
    }
}

fn max_of(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl Merge for MetricAccumulator {
    fn merge(&mut self, other: Self) {
        self.samples += other.samples;
        // Bounded inputs keep this far from saturating
        self.avg_sum_pico = self.avg_sum_pico.saturating_add(other.avg_sum_pico);
        self.max = max_of(self.max, other.max);
        self.p95_max = max_of(self.p95_max, other.p95_max);
        self.p95_sources += other.p95_sources;
    }
}

/// Recombined metric statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Average of hourly averages weighted by sample count
    pub avg: Option<f64>,
    pub max: Option<f64>,
    /// Max of the constituent p95 values
    pub p95: Option<f64>,
    /// Set when more than one p95 contributed, so `p95` is an upper bound
    pub p95_approximate: bool,
    pub samples: u64,
}

/// Mergeable core shared by windows, calendar and region aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupTotals {
    pub hours: u64,
    pub rx_bytes: u128,
    pub tx_bytes: u128,
    /// Sum over hours of the busier direction
    pub peak_bytes: u128,
    pub capacity_bits: u128,
    pub up_minutes: u64,
    pub observed_minutes: u64,
    pub flap_count: u64,
    pub hours_above: TierCounts,
    /// Hourly utilization percentages
    pub utilization: MetricAccumulator,
    pub loss: MetricAccumulator,
    pub jitter: MetricAccumulator,
    pub latency: MetricAccumulator,
}

impl RollupTotals {
    /// Totals of a single hour
    pub fn from_record(record: &HourlyKpiRecord, utilization_tiers: &TierThresholds) -> Self {
        Self {
            hours: 1,
            rx_bytes: u128::from(record.rx_bytes),
            tx_bytes: u128::from(record.tx_bytes),
            peak_bytes: u128::from(record.peak_bytes()),
            capacity_bits: record.capacity_bits(),
            up_minutes: u64::from(record.up_minutes),
            observed_minutes: u64::from(MINUTES_PER_HOUR),
            flap_count: u64::from(record.flap_count),
            hours_above: TierCounts::from_value(record.utilization_pct, utilization_tiers),
            utilization: MetricAccumulator::from_values(&[record.utilization_pct]),
            loss: MetricAccumulator::from_stats(record.quality.loss.as_ref()),
            jitter: MetricAccumulator::from_stats(record.quality.jitter.as_ref()),
            latency: MetricAccumulator::from_stats(record.quality.latency.as_ref()),
        }
    }

    /// Totals of a set of hours; the utilization p95 is exact over them
    pub fn from_records<'a, I>(records: I, utilization_tiers: &TierThresholds) -> Self
    where
        I: IntoIterator<Item = &'a HourlyKpiRecord>,
    {
        let mut utilization = Vec::new();
        let mut totals = records.into_iter().fold(Self::default(), |mut acc, record| {
            utilization.push(record.utilization_pct);
            acc.merge(Self::from_record(record, utilization_tiers));
            acc
        });
        totals.utilization = MetricAccumulator::from_values(&utilization);
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.hours == 0
    }

    pub fn metric(&self, metric: Metric) -> &MetricAccumulator {
        match metric {
            Metric::Utilization => &self.utilization,
            Metric::Loss => &self.loss,
            Metric::Jitter => &self.jitter,
            Metric::Latency => &self.latency,
        }
    }

    pub fn utilization_pct(&self) -> f64 {
        utilization_from_totals(self.peak_bytes, self.capacity_bits)
    }

    pub fn availability_pct(&self) -> f64 {
        period_availability_pct(self.up_minutes, self.observed_minutes)
    }

    pub fn down_minutes(&self) -> u64 {
        self.observed_minutes.saturating_sub(self.up_minutes)
    }

    /// Flaps per observed hour
    pub fn flap_rate(&self) -> f64 {
        if self.hours == 0 {
            return 0.0;
        }
        self.flap_count as f64 / self.hours as f64
    }
}

impl Merge for RollupTotals {
    fn merge(&mut self, other: Self) {
        self.hours += other.hours;
        self.rx_bytes += other.rx_bytes;
        self.tx_bytes += other.tx_bytes;
        self.peak_bytes += other.peak_bytes;
        self.capacity_bits += other.capacity_bits;
        self.up_minutes += other.up_minutes;
        self.observed_minutes += other.observed_minutes;
        self.flap_count += other.flap_count;
        self.hours_above.merge(other.hours_above);
        self.utilization.merge(other.utilization);
        self.loss.merge(other.loss);
        self.jitter.merge(other.jitter);
        self.latency.merge(other.latency);
    }
}

/// Metrics derived from [`RollupTotals`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub utilization_pct: f64,
    pub availability_pct: f64,
    pub down_minutes: u64,
    pub flap_count: u64,
    pub flap_rate: f64,
    pub hours_above: TierCounts,
    /// Average, max and p95 of the hourly utilization percentages
    pub utilization: MetricSummary,
    pub loss: MetricSummary,
    pub jitter: MetricSummary,
    pub latency: MetricSummary,
}

impl From<&RollupTotals> for AggregateMetrics {
    fn from(totals: &RollupTotals) -> Self {
        Self {
            utilization_pct: totals.utilization_pct(),
            availability_pct: totals.availability_pct(),
            down_minutes: totals.down_minutes(),
            flap_count: totals.flap_count,
            flap_rate: totals.flap_rate(),
            hours_above: totals.hours_above,
            utilization: totals.utilization.summary(),
            loss: totals.loss.summary(),
            jitter: totals.jitter.summary(),
            latency: totals.latency.summary(),
        }
    }
}

impl AggregateMetrics {
    pub fn metric(&self, metric: Metric) -> &MetricSummary {
        match metric {
            Metric::Utilization => &self.utilization,
            Metric::Loss => &self.loss,
            Metric::Jitter => &self.jitter,
            Metric::Latency => &self.latency,
        }
    }
}
