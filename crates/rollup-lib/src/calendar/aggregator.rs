//! Per-circuit calendar rollups
//!
//! Hourly records roll into daily aggregates, and daily aggregates roll into
//! ISO-week or month aggregates. Hours are always totalled per day first and
//! longer periods merge the day totals, so a period computed from hours and
//! the same period computed from its days are identical. The utilization p95
//! of a day is exact; longer periods carry the max of the daily values.

use super::period::{Grain, Period};
use super::totals::{AggregateMetrics, RollupTotals};
use crate::error::{Result, RollupError};
use crate::merge::{merge_all, Merge};
use crate::models::{CircuitKey, HourKey, HourlyKpiRecord};
use crate::threshold::{ThresholdConfig, TierThresholds};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Rollup of one circuit over one calendar period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarAggregate {
    pub site_id: String,
    pub circuit_id: String,
    pub grain: Grain,
    pub period: Period,
    pub period_key: String,
    pub totals: RollupTotals,
    pub metrics: AggregateMetrics,
}

impl CalendarAggregate {
    pub fn new(circuit: &CircuitKey, period: Period, totals: RollupTotals) -> Self {
        let metrics = AggregateMetrics::from(&totals);
        Self {
            site_id: circuit.site_id.clone(),
            circuit_id: circuit.circuit_id.clone(),
            grain: period.grain(),
            period,
            period_key: period.key(),
            totals,
            metrics,
        }
    }

    pub fn circuit_key(&self) -> CircuitKey {
        CircuitKey::new(&self.site_id, &self.circuit_id)
    }
}

impl Merge for CalendarAggregate {
    fn merge(&mut self, other: Self) {
        self.totals.merge(other.totals);
        self.metrics = AggregateMetrics::from(&self.totals);
    }
}

/// Calendar aggregates keyed by circuit and period
pub type CalendarBuckets = BTreeMap<(CircuitKey, Period), CalendarAggregate>;

#[derive(Debug, Clone, Copy)]
pub struct CalendarAggregator {
    utilization_tiers: TierThresholds,
}

impl Default for CalendarAggregator {
    fn default() -> Self {
        Self::new(ThresholdConfig::default().utilization)
    }
}

impl CalendarAggregator {
    /// `utilization_tiers` drive the hours-above counts
    pub fn new(utilization_tiers: TierThresholds) -> Self {
        Self { utilization_tiers }
    }

    /// Roll up one period of one circuit from its hour-keyed records
    ///
    /// # Returns
    /// * `Err(MissingData)` if no hour of the period is present
    pub fn roll_up_period(
        &self,
        circuit: &CircuitKey,
        hours: &BTreeMap<HourKey, HourlyKpiRecord>,
        period: Period,
    ) -> Result<CalendarAggregate> {
        let missing = || RollupError::MissingData {
            entity: circuit.to_string(),
            period: period.key(),
        };
        let (start, end) = period.hour_range().ok_or_else(missing)?;

        let totals: RollupTotals =
            merge_all(self.day_totals(hours.range(start..end).map(|(_, record)| record)).into_values());
        if totals.is_empty() {
            return Err(missing());
        }
        Ok(CalendarAggregate::new(circuit, period, totals))
    }

    /// Totals per circuit and day
    fn day_totals<'a, I>(&self, records: I) -> BTreeMap<(CircuitKey, NaiveDate), RollupTotals>
    where
        I: IntoIterator<Item = &'a HourlyKpiRecord>,
    {
        let mut days: BTreeMap<(CircuitKey, NaiveDate), Vec<&HourlyKpiRecord>> = BTreeMap::new();
        for record in records {
            days.entry((record.circuit_key(), record.hour.date()))
                .or_default()
                .push(record);
        }
        days.into_iter()
            .map(|(key, day)| (key, RollupTotals::from_records(day, &self.utilization_tiers)))
            .collect()
    }

    /// Bucket hourly records of any number of circuits by period of `grain`
    pub fn bucket_hourly(&self, records: &[HourlyKpiRecord], grain: Grain) -> CalendarBuckets {
        let mut buckets = CalendarBuckets::new();
        for ((circuit, date), totals) in self.day_totals(records) {
            let period = Period::containing(grain, date);
            let partial = CalendarAggregate::new(&circuit, period, totals);
            buckets.merge(BTreeMap::from([((circuit, period), partial)]));
        }
        buckets
    }

    /// Roll hourly records into aggregates of `grain`, ordered by circuit and period
    pub fn roll_up_hourly(&self, records: &[HourlyKpiRecord], grain: Grain) -> Vec<CalendarAggregate> {
        let aggregates: Vec<_> = self.bucket_hourly(records, grain).into_values().collect();
        debug!(
            grain = %grain,
            records = records.len(),
            aggregates = aggregates.len(),
            "Rolled up hourly records"
        );
        aggregates
    }

    /// Roll daily aggregates into weekly or monthly aggregates
    ///
    /// # Returns
    /// * `Err(GrainMismatch)` if an input is not daily or `grain` is daily
    pub fn roll_up_daily(&self, daily: &[CalendarAggregate], grain: Grain) -> Result<Vec<CalendarAggregate>> {
        if grain == Grain::Daily {
            return Err(RollupError::GrainMismatch {
                expected: "weekly or monthly target".to_string(),
                found: grain.to_string(),
            });
        }

        let mut buckets = CalendarBuckets::new();
        for aggregate in daily {
            let Period::Day(date) = aggregate.period else {
                return Err(RollupError::GrainMismatch {
                    expected: Grain::Daily.to_string(),
                    found: aggregate.grain.to_string(),
                });
            };
            let circuit = aggregate.circuit_key();
            let period = Period::containing(grain, date);
            let partial = CalendarAggregate::new(&circuit, period, aggregate.totals.clone());
            buckets.merge(BTreeMap::from([((circuit, period), partial)]));
        }

        debug!(grain = %grain, days = daily.len(), aggregates = buckets.len(), "Rolled up daily aggregates");
        Ok(buckets.into_values().collect())
    }
}
