//! Calendar and region aggregation
//!
//! This module provides:
//! - Daily, ISO-weekly and monthly periods with warehouse keys
//! - Exactly mergeable rollup totals and the metrics derived from them
//! - Hourly to daily and daily to weekly/monthly rollups per circuit
//! - Region rollups over a read-only site mapping

mod aggregator;
mod period;
mod region;
mod totals;

pub use aggregator::{CalendarAggregate, CalendarAggregator, CalendarBuckets};
pub use period::{Grain, Period};
pub use region::{RegionAggregate, RegionAggregator, RegionBuckets, RegionMap, UNKNOWN_REGION};
pub use totals::{
    percentile, AggregateMetrics, MetricAccumulator, MetricSummary, RollupTotals, TierCounts,
    AVG_SCALE,
};
