//! Observability infrastructure for the rollup engine
//!
//! Provides:
//! - Prometheus metrics (rollup and window latency, samples, partitions, fallbacks)
//! - Structured JSON logging with tracing

use crate::coordinator::MergeOutcome;
use crate::error::RollupError;
use crate::models::Metric;
use crate::threshold::ThresholdTier;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for engine latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static GLOBAL_METRICS: OnceLock<RollupMetricsInner> = OnceLock::new();

struct RollupMetricsInner {
    rollup_latency_seconds: Histogram,
    window_latency_seconds: Histogram,
    rollups_computed: IntCounterVec,
    samples_processed: IntCounter,
    invalid_samples: IntCounter,
    partitions_dispatched: IntCounter,
    deadline_fallback_units: IntCounter,
    merge_mismatches: IntCounter,
    workers: IntGauge,
}

impl RollupMetricsInner {
    fn new() -> Self {
        Self {
            rollup_latency_seconds: register_histogram!(
                "circuit_rollup_latency_seconds",
                "Time spent computing calendar and region rollups",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register rollup_latency_seconds"),

            window_latency_seconds: register_histogram!(
                "circuit_rollup_window_latency_seconds",
                "Time spent computing rolling window snapshots",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register window_latency_seconds"),

            rollups_computed: register_int_counter_vec!(
                "circuit_rollup_rollups_total",
                "Rollup requests completed, by grain",
                &["grain"]
            )
            .expect("Failed to register rollups_computed"),

            samples_processed: register_int_counter!(
                "circuit_rollup_samples_processed_total",
                "Raw hourly samples accepted by the engine"
            )
            .expect("Failed to register samples_processed"),

            invalid_samples: register_int_counter!(
                "circuit_rollup_invalid_samples_total",
                "Batches rejected because of an invalid sample"
            )
            .expect("Failed to register invalid_samples"),

            partitions_dispatched: register_int_counter!(
                "circuit_rollup_partitions_dispatched_total",
                "Partitions handed to the worker pool"
            )
            .expect("Failed to register partitions_dispatched"),

            deadline_fallback_units: register_int_counter!(
                "circuit_rollup_deadline_fallback_units_total",
                "Work units computed sequentially after the merge deadline"
            )
            .expect("Failed to register deadline_fallback_units"),

            merge_mismatches: register_int_counter!(
                "circuit_rollup_merge_mismatches_total",
                "Parallel merges that diverged from sequential execution"
            )
            .expect("Failed to register merge_mismatches"),

            workers: register_int_gauge!(
                "circuit_rollup_workers",
                "Worker threads in the merge coordinator pool"
            )
            .expect("Failed to register workers"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the process-global metrics; clones share them.
#[derive(Clone)]
pub struct RollupMetrics {
    _private: (),
}

impl Default for RollupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RollupMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RollupMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RollupMetricsInner {
        GLOBAL_METRICS.get_or_init(RollupMetricsInner::new)
    }

    pub fn observe_rollup_latency(&self, duration_secs: f64) {
        self.inner().rollup_latency_seconds.observe(duration_secs);
    }

    pub fn observe_window_latency(&self, duration_secs: f64) {
        self.inner().window_latency_seconds.observe(duration_secs);
    }

    pub fn inc_rollups(&self, grain: &str) {
        self.inner().rollups_computed.with_label_values(&[grain]).inc();
    }

    pub fn add_samples_processed(&self, count: usize) {
        self.inner().samples_processed.inc_by(count as u64);
    }

    pub fn inc_invalid_samples(&self) {
        self.inner().invalid_samples.inc();
    }

    pub fn inc_merge_mismatches(&self) {
        self.inner().merge_mismatches.inc();
    }

    pub fn set_workers(&self, workers: usize) {
        self.inner().workers.set(workers as i64);
    }

    /// Record partition and fallback counts of a finished merge
    pub fn record_outcome<T>(&self, outcome: &MergeOutcome<T>) {
        let inner = self.inner();
        inner.partitions_dispatched.inc_by(outcome.partitions as u64);
        inner.deadline_fallback_units.inc_by(outcome.fallback_units as u64);
    }

    /// Count an engine error against the matching metric
    pub fn record_error(&self, err: &RollupError) {
        match err {
            RollupError::InvalidInput { .. } => self.inc_invalid_samples(),
            RollupError::PartitionMismatch { .. } => self.inc_merge_mismatches(),
            _ => {}
        }
    }
}

/// Structured logger for engine events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, workers: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            workers = workers,
            "Rollup agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Rollup agent shutting down"
        );
    }

    pub fn log_rollup_completed(&self, kind: &str, samples: usize, partitions: usize, elapsed_secs: f64) {
        info!(
            event = "rollup_completed",
            instance = %self.instance,
            kind = %kind,
            samples = samples,
            partitions = partitions,
            elapsed_secs = elapsed_secs,
            "Rollup completed"
        );
    }

    /// Log a batch rejected by the engine
    pub fn log_rejected(&self, err: &RollupError) {
        match err {
            RollupError::InvalidInput {
                site_id,
                circuit_id,
                hour,
                reason,
            } => {
                warn!(
                    event = "invalid_input",
                    instance = %self.instance,
                    site_id = %site_id,
                    circuit_id = %circuit_id,
                    hour = %hour,
                    reason = %reason,
                    "Rejected batch with invalid sample"
                );
            }
            RollupError::PartitionMismatch { partitions, detail } => {
                warn!(
                    event = "partition_mismatch",
                    instance = %self.instance,
                    partitions = partitions,
                    detail = %detail,
                    "Parallel merge diverged from sequential result"
                );
            }
            other => {
                info!(
                    event = "request_failed",
                    instance = %self.instance,
                    kind = other.kind(),
                    error = %other,
                    "Engine request failed"
                );
            }
        }
    }

    pub fn log_breach(
        &self,
        site_id: &str,
        circuit_id: &str,
        metric: Metric,
        tier: ThresholdTier,
        continuous_hours: u32,
        cumulative_hours: u32,
    ) {
        match tier {
            ThresholdTier::Critical => {
                warn!(
                    event = "breach_detected",
                    instance = %self.instance,
                    site_id = %site_id,
                    circuit_id = %circuit_id,
                    metric = %metric,
                    tier = %tier,
                    continuous_hours = continuous_hours,
                    cumulative_hours = cumulative_hours,
                    "Critical threshold breached"
                );
            }
            _ => {
                info!(
                    event = "breach_detected",
                    instance = %self.instance,
                    site_id = %site_id,
                    circuit_id = %circuit_id,
                    metric = %metric,
                    tier = %tier,
                    continuous_hours = continuous_hours,
                    cumulative_hours = cumulative_hours,
                    "Threshold breached"
                );
            }
        }
    }

    pub fn log_deadline_fallback(&self, units: usize, partitions: usize) {
        warn!(
            event = "deadline_fallback",
            instance = %self.instance,
            units = units,
            partitions = partitions,
            "Merge deadline missed, units finished on the caller"
        );
    }
}
