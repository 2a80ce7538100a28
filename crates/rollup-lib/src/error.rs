//! Error taxonomy for the rollup engine
//!
//! Input validation failures propagate to the caller with the offending
//! sample identified. Missing data is only an error for calendar periods;
//! windowed computations report it through an `insufficient_data` flag.

use crate::models::HourKey;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, RollupError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RollupError {
    /// Malformed raw sample, never corrected locally
    #[error("invalid sample {site_id}/{circuit_id} at {hour}: {reason}")]
    InvalidInput {
        site_id: String,
        circuit_id: String,
        hour: HourKey,
        reason: String,
    },

    /// A calendar period with no present hours
    #[error("no data for {entity} in period {period}")]
    MissingData { entity: String, period: String },

    /// Parallel merge diverged from sequential execution
    #[error("merge over {partitions} partitions diverged from sequential result: {detail}")]
    PartitionMismatch { partitions: usize, detail: String },

    /// Series handed to the threshold evaluator is not strictly increasing
    #[error("series hour {current} does not follow {previous}")]
    UnorderedSeries { previous: HourKey, current: HourKey },

    /// Aggregate of the wrong grain handed to a rollup step
    #[error("expected {expected} aggregates, found {found}")]
    GrainMismatch { expected: String, found: String },

    #[error("invalid thresholds for {metric}: {reason}")]
    InvalidThresholds { metric: String, reason: String },

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl RollupError {
    pub fn invalid_input(
        site_id: &str,
        circuit_id: &str,
        hour: HourKey,
        reason: impl Into<String>,
    ) -> Self {
        RollupError::InvalidInput {
            site_id: site_id.to_string(),
            circuit_id: circuit_id.to_string(),
            hour,
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in API error bodies and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RollupError::InvalidInput { .. } => "invalid_input",
            RollupError::MissingData { .. } => "missing_data",
            RollupError::PartitionMismatch { .. } => "partition_mismatch",
            RollupError::UnorderedSeries { .. } => "unordered_series",
            RollupError::GrainMismatch { .. } => "grain_mismatch",
            RollupError::InvalidThresholds { .. } => "invalid_thresholds",
            RollupError::WorkerPool(_) => "worker_pool",
        }
    }

    /// True for errors caused by the caller's input rather than the engine
    ///
    /// Thresholds come from the agent's configured profile, so an invalid
    /// resolution is a configuration fault rather than a caller error.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RollupError::InvalidInput { .. }
                | RollupError::UnorderedSeries { .. }
                | RollupError::GrainMismatch { .. }
        )
    }
}

impl From<rayon::ThreadPoolBuildError> for RollupError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        RollupError::WorkerPool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message_identifies_sample() {
        let hour: HourKey = "2024010112".parse().unwrap();
        let err = RollupError::invalid_input("site-1", "dev:wan0", hour, "bandwidth must be positive");
        let msg = err.to_string();
        assert!(msg.contains("site-1/dev:wan0"));
        assert!(msg.contains("2024010112"));
        assert!(msg.contains("bandwidth must be positive"));
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_missing_data_is_not_caller_error() {
        let err = RollupError::MissingData {
            entity: "site-1/dev:wan0".into(),
            period: "20240101".into(),
        };
        assert!(!err.is_caller_error());
        assert_eq!(err.kind(), "missing_data");
    }

    #[test]
    fn test_invalid_thresholds_is_not_caller_error() {
        let err = RollupError::InvalidThresholds {
            metric: "utilization".into(),
            reason: "warn 75 must be below high 72".into(),
        };
        assert!(!err.is_caller_error());
        assert_eq!(err.kind(), "invalid_thresholds");
    }
}
