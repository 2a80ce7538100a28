//! Rollup engine for per-circuit network samples
//!
//! This crate provides the core functionality for:
//! - Hourly KPI derivation (utilization, availability, flaps)
//! - Threshold breach analysis, continuous and cumulative
//! - Rolling 3h/12h/24h window snapshots
//! - Daily, weekly, monthly and region rollups
//! - Parallel computation with exact partial merges
//! - Health checks and observability for the host

pub mod calendar;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod kpi;
pub mod merge;
pub mod models;
pub mod observability;
pub mod threshold;
pub mod window;

pub use calendar::{
    AggregateMetrics, CalendarAggregate, CalendarAggregator, Grain, MetricSummary, Period,
    RegionAggregate, RegionAggregator, RegionMap, RollupTotals,
};
pub use coordinator::{
    CoordinatorConfig, MergeOutcome, ParallelMergeCoordinator, RollupReport, WindowReport,
};
pub use error::{Result, RollupError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use kpi::{assess_record, CircuitHealth, CircuitSeries, KpiCalculator};
pub use merge::Merge;
pub use models::*;
pub use observability::{RollupMetrics, StructuredLogger};
pub use threshold::{
    evaluate, HourWindow, SeriesPoint, Severity, ThresholdConfig, ThresholdProfile,
    ThresholdWindowResult,
};
pub use window::{RollingWindowAggregator, WindowSize, WindowSnapshot};
