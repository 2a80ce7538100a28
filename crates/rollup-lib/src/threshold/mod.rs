//! Threshold evaluation and configuration
//!
//! This module provides:
//! - Continuous and cumulative breach analysis over hourly series
//! - Warn/high/critical tiers and severity classification
//! - Threshold profiles with region and store-type overrides

mod evaluator;
mod profile;
mod tiers;

pub use evaluator::{evaluate, HourWindow, SeriesPoint, ThresholdEvaluator, ThresholdWindowResult};
pub use profile::{ThresholdOverrides, ThresholdProfile, TierOverrides};
pub use tiers::{Severity, ThresholdConfig, ThresholdTier, TierThresholds};
