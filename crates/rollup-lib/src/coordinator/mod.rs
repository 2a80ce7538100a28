//! Parallel merge coordination
//!
//! This module provides:
//! - Contiguous partitioning of independent work units
//! - Fork-join execution on a rayon pool with exact partial merges
//! - Deadline fallback and optional sequential verification
//! - Batch pipelines for KPIs, calendar, region and window results

mod pipeline;
mod pool;

pub use pipeline::{circuit_work_units, CircuitWindows, CircuitWorkUnit, RollupReport, WindowReport};
pub use pool::{partition, partition_ranges, CoordinatorConfig, MergeOutcome, ParallelMergeCoordinator};
