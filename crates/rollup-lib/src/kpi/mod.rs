//! Hourly KPI derivation
//!
//! This module provides:
//! - Sample validation with the offending hour identified
//! - Utilization, availability and status per hour
//! - Flap detection across consecutive hours
//! - Per-hour health classification against thresholds

mod assessment;
mod calculator;

pub use assessment::{assess_record, CircuitHealth, MetricAssessment};
pub use calculator::{
    availability_pct, period_availability_pct, utilization_from_totals, CircuitSeries,
    KpiCalculator,
};
