//! End-to-end computations over batches of raw samples
//!
//! Each circuit is an independent, serializable work unit. Workers derive
//! hourly KPIs for their circuits and produce partial calendar, region and
//! window results that the coordinator merges.

use super::pool::{MergeOutcome, ParallelMergeCoordinator};
use crate::calendar::{
    CalendarAggregate, CalendarAggregator, CalendarBuckets, Grain, RegionAggregate,
    RegionAggregator, RegionBuckets, RegionMap,
};
use crate::error::Result;
use crate::kpi::KpiCalculator;
use crate::merge::Merge;
use crate::models::{CircuitKey, HourKey, HourlySample, HourlyKpiRecord};
use crate::threshold::{ThresholdConfig, TierThresholds};
use crate::window::{RollingWindowAggregator, WindowSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Raw samples of a single circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitWorkUnit {
    pub key: CircuitKey,
    pub samples: Vec<HourlySample>,
}

/// Group a batch into one work unit per circuit, ordered by circuit
pub fn circuit_work_units(samples: &[HourlySample]) -> Vec<CircuitWorkUnit> {
    let mut grouped: BTreeMap<CircuitKey, Vec<HourlySample>> = BTreeMap::new();
    for sample in samples {
        grouped.entry(sample.circuit_key()).or_default().push(sample.clone());
    }
    grouped
        .into_iter()
        .map(|(key, samples)| CircuitWorkUnit { key, samples })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupReport {
    pub grain: Grain,
    pub hourly_records: Vec<HourlyKpiRecord>,
    pub circuits: Vec<CalendarAggregate>,
    pub regions: Vec<RegionAggregate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitWindows {
    pub site_id: String,
    pub circuit_id: String,
    pub snapshots: Vec<WindowSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowReport {
    pub reference_hour: HourKey,
    pub circuits: Vec<CircuitWindows>,
}

#[derive(Debug, Default, PartialEq)]
struct RollupPartial {
    records: BTreeMap<CircuitKey, Vec<HourlyKpiRecord>>,
    circuits: CalendarBuckets,
    regions: RegionBuckets,
}

impl Merge for RollupPartial {
    fn merge(&mut self, other: Self) {
        self.records.merge(other.records);
        self.circuits.merge(other.circuits);
        self.regions.merge(other.regions);
    }
}

fn into_buckets(aggregates: Vec<CalendarAggregate>) -> CalendarBuckets {
    aggregates
        .into_iter()
        .map(|a| ((a.circuit_key(), a.period), a))
        .collect()
}

impl ParallelMergeCoordinator {
    /// Derive hourly KPI records for a batch
    pub fn compute_kpis(&self, samples: &[HourlySample]) -> Result<MergeOutcome<Vec<HourlyKpiRecord>>> {
        let units = circuit_work_units(samples);
        let calculator = KpiCalculator::new();

        let outcome = self.map_reduce(&units, |unit| {
            let records = calculator.derive_records(&unit.samples)?;
            Ok(BTreeMap::from([(unit.key.clone(), records)]))
        })?;
        Ok(outcome.map(|by_circuit| by_circuit.into_values().flatten().collect()))
    }

    /// Roll hourly records into calendar aggregates of `grain`
    pub fn compute_calendar(
        &self,
        records: &[HourlyKpiRecord],
        grain: Grain,
        utilization_tiers: &TierThresholds,
    ) -> Result<MergeOutcome<Vec<CalendarAggregate>>> {
        let mut grouped: BTreeMap<CircuitKey, Vec<HourlyKpiRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.circuit_key()).or_default().push(record.clone());
        }
        let units: Vec<Vec<HourlyKpiRecord>> = grouped.into_values().collect();
        let aggregator = CalendarAggregator::new(*utilization_tiers);

        let outcome = self.map_reduce(&units, |circuit_records| {
            Ok(aggregator.bucket_hourly(circuit_records, grain))
        })?;
        Ok(outcome.map(|buckets| buckets.into_values().collect()))
    }

    /// Roll circuit aggregates into region aggregates
    pub fn compute_regions(
        &self,
        aggregates: &[CalendarAggregate],
        regions: &RegionMap,
    ) -> Result<MergeOutcome<Vec<RegionAggregate>>> {
        let aggregator = RegionAggregator::new(regions.clone());
        let outcome = self.map_reduce(aggregates, |aggregate| Ok(aggregator.bucket([aggregate])))?;
        Ok(outcome.map(|buckets| buckets.into_values().collect()))
    }

    /// Samples to hourly KPIs, circuit aggregates of `grain` and region aggregates
    ///
    /// Weekly and monthly aggregates are built from daily ones.
    pub fn compute_rollups(
        &self,
        samples: &[HourlySample],
        grain: Grain,
        regions: &RegionMap,
        utilization_tiers: &TierThresholds,
    ) -> Result<MergeOutcome<RollupReport>> {
        let units = circuit_work_units(samples);
        let calculator = KpiCalculator::new();
        let calendar = CalendarAggregator::new(*utilization_tiers);
        let region_aggregator = RegionAggregator::new(regions.clone());

        let outcome = self.map_reduce(&units, |unit| {
            let records = calculator.derive_records(&unit.samples)?;
            let daily = calendar.bucket_hourly(&records, Grain::Daily);
            let circuits = match grain {
                Grain::Daily => daily,
                Grain::Weekly | Grain::Monthly => {
                    let daily: Vec<_> = daily.into_values().collect();
                    into_buckets(calendar.roll_up_daily(&daily, grain)?)
                }
            };
            let regions = region_aggregator.bucket(circuits.values());
            Ok(RollupPartial {
                records: BTreeMap::from([(unit.key.clone(), records)]),
                circuits,
                regions,
            })
        })?;

        debug!(
            grain = %grain,
            circuits = outcome.value.records.len(),
            aggregates = outcome.value.circuits.len(),
            regions = outcome.value.regions.len(),
            "Computed rollups"
        );

        Ok(outcome.map(|partial| RollupReport {
            grain,
            hourly_records: partial.records.into_values().flatten().collect(),
            circuits: partial.circuits.into_values().collect(),
            regions: partial.regions.into_values().collect(),
        }))
    }

    /// 3h, 12h and 24h snapshots for every circuit of a batch
    pub fn compute_windows(
        &self,
        samples: &[HourlySample],
        reference_hour: HourKey,
        thresholds: &ThresholdConfig,
    ) -> Result<MergeOutcome<WindowReport>> {
        let units = circuit_work_units(samples);
        let calculator = KpiCalculator::new();
        let windows = RollingWindowAggregator::new();

        let outcome = self.map_reduce(&units, |unit| {
            let mut by_circuit = BTreeMap::new();
            for series in calculator.derive_series(&unit.samples)? {
                let snapshots = windows.compute_all_windows(&series, reference_hour, thresholds)?;
                by_circuit.insert(series.key, snapshots);
            }
            Ok(by_circuit)
        })?;

        Ok(outcome.map(|by_circuit: BTreeMap<CircuitKey, Vec<WindowSnapshot>>| WindowReport {
            reference_hour,
            circuits: by_circuit
                .into_iter()
                .map(|(key, snapshots)| CircuitWindows {
                    site_id: key.site_id,
                    circuit_id: key.circuit_id,
                    snapshots,
                })
                .collect(),
        }))
    }
}
