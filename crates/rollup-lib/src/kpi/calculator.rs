//! Per-hour KPI derivation
//!
//! Validates raw samples and turns them into [`HourlyKpiRecord`]s:
//! utilization from the busier traffic direction, availability from
//! up-minutes, and flaps from hour-over-hour status transitions.

use crate::error::{Result, RollupError};
use crate::models::{
    CircuitKey, CircuitStatus, HourKey, HourlySample, HourlyKpiRecord, Metric, MetricStats,
    MAX_QUALITY_VALUE, MINUTES_PER_HOUR, SECONDS_PER_HOUR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Utilization percentage from bytes moved and capacity in bits, capped at 100
///
/// Returns 0.0 when there is no capacity to compare against.
pub fn utilization_from_totals(peak_bytes: u128, capacity_bits: u128) -> f64 {
    if capacity_bits == 0 {
        return 0.0;
    }
    let pct = (peak_bytes as f64 * 8.0) / capacity_bits as f64 * 100.0;
    pct.min(100.0)
}

/// Availability of a single hour
pub fn availability_pct(up_minutes: u32) -> f64 {
    f64::from(up_minutes.min(MINUTES_PER_HOUR)) / f64::from(MINUTES_PER_HOUR) * 100.0
}

/// Availability over a period; exactly 0.0 when no minutes were observed
pub fn period_availability_pct(up_minutes: u64, total_minutes: u64) -> f64 {
    if total_minutes == 0 {
        return 0.0;
    }
    up_minutes as f64 / total_minutes as f64 * 100.0
}

/// Validated hourly records of one circuit, strictly ordered by hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSeries {
    pub key: CircuitKey,
    pub records: Vec<HourlyKpiRecord>,
}

impl CircuitSeries {
    /// Build a series, checking identity and ordering of `records`
    pub fn new(key: CircuitKey, records: Vec<HourlyKpiRecord>) -> Result<Self> {
        for pair in records.windows(2) {
            if pair[1].hour <= pair[0].hour {
                return Err(RollupError::UnorderedSeries {
                    previous: pair[0].hour,
                    current: pair[1].hour,
                });
            }
        }
        if let Some(stray) = records
            .iter()
            .find(|r| r.site_id != key.site_id || r.circuit_id != key.circuit_id)
        {
            return Err(RollupError::invalid_input(
                &stray.site_id,
                &stray.circuit_id,
                stray.hour,
                format!("record does not belong to circuit {key}"),
            ));
        }
        Ok(Self { key, records })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records keyed by hour
    pub fn by_hour(&self) -> BTreeMap<HourKey, HourlyKpiRecord> {
        self.records.iter().map(|r| (r.hour, r.clone())).collect()
    }

    /// Total flaps in the series
    pub fn flap_count(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.flap_count)).sum()
    }
}

/// Stateless calculator for derived per-hour KPIs
#[derive(Debug, Clone, Copy, Default)]
pub struct KpiCalculator;

impl KpiCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Reject malformed samples, identifying the offending hour
    pub fn validate(&self, sample: &HourlySample) -> Result<()> {
        let invalid = |reason: String| {
            RollupError::invalid_input(&sample.site_id, &sample.circuit_id, sample.hour, reason)
        };

        if sample.rx_bytes < 0 {
            return Err(invalid(format!("rx_bytes is negative ({})", sample.rx_bytes)));
        }
        if sample.tx_bytes < 0 {
            return Err(invalid(format!("tx_bytes is negative ({})", sample.tx_bytes)));
        }
        if sample.bandwidth_bps <= 0 {
            return Err(invalid(format!(
                "bandwidth_bps must be positive ({})",
                sample.bandwidth_bps
            )));
        }
        if !(0..=MINUTES_PER_HOUR as i32).contains(&sample.up_minutes) {
            return Err(invalid(format!(
                "up_minutes outside 0..=60 ({})",
                sample.up_minutes
            )));
        }
        for metric in Metric::QUALITY {
            if let Some(stats) = sample.quality.get(metric) {
                validate_stats(metric, stats).map_err(invalid)?;
            }
        }
        Ok(())
    }

    /// Utilization of one sample
    pub fn utilization_pct(&self, sample: &HourlySample) -> Result<f64> {
        self.validate(sample)?;
        let peak = sample.rx_bytes.max(sample.tx_bytes) as u128;
        let capacity = sample.bandwidth_bps as u128 * SECONDS_PER_HOUR as u128;
        Ok(utilization_from_totals(peak, capacity))
    }

    /// Derive the record for one hour given the status of the hour before it
    pub fn derive_record(
        &self,
        sample: &HourlySample,
        previous_status: Option<CircuitStatus>,
    ) -> Result<HourlyKpiRecord> {
        let utilization_pct = self.utilization_pct(sample)?;
        let up_minutes = sample.up_minutes as u32;
        let status = CircuitStatus::from_up_minutes(up_minutes);
        let flap = previous_status.is_some_and(|prev| prev != status);

        Ok(HourlyKpiRecord {
            site_id: sample.site_id.clone(),
            circuit_id: sample.circuit_id.clone(),
            hour: sample.hour,
            utilization_pct,
            availability_pct: availability_pct(up_minutes),
            status,
            flap,
            flap_count: u32::from(flap),
            rx_bytes: sample.rx_bytes as u64,
            tx_bytes: sample.tx_bytes as u64,
            bandwidth_bps: sample.bandwidth_bps as u64,
            up_minutes,
            quality: sample.quality,
        })
    }

    /// Derive records for a batch, grouped per circuit and ordered by hour
    ///
    /// The first hour of a circuit, and any hour whose predecessor is
    /// missing, has no prior state and cannot be a flap.
    pub fn derive_series(&self, samples: &[HourlySample]) -> Result<Vec<CircuitSeries>> {
        let mut grouped: BTreeMap<CircuitKey, Vec<&HourlySample>> = BTreeMap::new();
        for sample in samples {
            grouped.entry(sample.circuit_key()).or_default().push(sample);
        }

        let mut series = Vec::with_capacity(grouped.len());
        for (key, mut circuit_samples) in grouped {
            circuit_samples.sort_by_key(|s| s.hour);

            let mut records: Vec<HourlyKpiRecord> = Vec::with_capacity(circuit_samples.len());
            for sample in circuit_samples {
                let previous = records.last();
                if previous.is_some_and(|p| p.hour == sample.hour) {
                    return Err(RollupError::invalid_input(
                        &sample.site_id,
                        &sample.circuit_id,
                        sample.hour,
                        "duplicate sample for hour",
                    ));
                }
                let previous_status = previous
                    .filter(|p| sample.hour.hours_since(p.hour) == 1)
                    .map(|p| p.status);
                records.push(self.derive_record(sample, previous_status)?);
            }

            debug!(circuit = %key, hours = records.len(), "Derived hourly KPIs");
            series.push(CircuitSeries { key, records });
        }

        Ok(series)
    }

    /// Derive records for a batch as one flat list
    pub fn derive_records(&self, samples: &[HourlySample]) -> Result<Vec<HourlyKpiRecord>> {
        Ok(self
            .derive_series(samples)?
            .into_iter()
            .flat_map(|s| s.records)
            .collect())
    }
}

fn validate_stats(metric: Metric, stats: &MetricStats) -> std::result::Result<(), String> {
    for (name, value) in [("avg", stats.avg), ("max", stats.max), ("p95", stats.p95)] {
        if !value.is_finite() {
            return Err(format!("{metric} {name} is not finite"));
        }
        if value < 0.0 {
            return Err(format!("{metric} {name} is negative ({value})"));
        }
        if value > MAX_QUALITY_VALUE {
            return Err(format!("{metric} {name} exceeds {MAX_QUALITY_VALUE} ({value})"));
        }
    }
    Ok(())
}
