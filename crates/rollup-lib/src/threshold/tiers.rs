//! Threshold tiers and severity classification

use crate::error::{Result, RollupError};
use crate::models::Metric;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Threshold tier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdTier {
    Warn,
    High,
    Critical,
}

impl ThresholdTier {
    pub const ALL: [ThresholdTier; 3] = [ThresholdTier::Warn, ThresholdTier::High, ThresholdTier::Critical];
}

impl fmt::Display for ThresholdTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdTier::Warn => write!(f, "warn"),
            ThresholdTier::High => write!(f, "high"),
            ThresholdTier::Critical => write!(f, "critical"),
        }
    }
}

/// Severity of a single observation; `Unknown` when the metric is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Normal,
    Warn,
    High,
    Critical,
}

impl From<ThresholdTier> for Severity {
    fn from(tier: ThresholdTier) -> Self {
        match tier {
            ThresholdTier::Warn => Severity::Warn,
            ThresholdTier::High => Severity::High,
            ThresholdTier::Critical => Severity::Critical,
        }
    }
}

/// Resolved warn/high/critical boundaries for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub warn: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierThresholds {
    pub const fn new(warn: f64, high: f64, critical: f64) -> Self {
        Self { warn, high, critical }
    }

    pub fn get(&self, tier: ThresholdTier) -> f64 {
        match tier {
            ThresholdTier::Warn => self.warn,
            ThresholdTier::High => self.high,
            ThresholdTier::Critical => self.critical,
        }
    }

    pub fn tiers(&self) -> [(ThresholdTier, f64); 3] {
        ThresholdTier::ALL.map(|tier| (tier, self.get(tier)))
    }

    /// Highest tier strictly exceeded by `value`
    pub fn classify(&self, value: f64) -> Severity {
        if value > self.critical {
            Severity::Critical
        } else if value > self.high {
            Severity::High
        } else if value > self.warn {
            Severity::Warn
        } else {
            Severity::Normal
        }
    }

    pub fn validate(&self, metric: Metric) -> Result<()> {
        let invalid = |reason: String| RollupError::InvalidThresholds {
            metric: metric.to_string(),
            reason,
        };
        for (tier, value) in self.tiers() {
            if !value.is_finite() {
                return Err(invalid(format!("{tier} threshold is not finite")));
            }
        }
        if self.warn > self.high || self.high > self.critical {
            return Err(invalid(format!(
                "tiers must satisfy warn <= high <= critical, got {}/{}/{}",
                self.warn, self.high, self.critical
            )));
        }
        Ok(())
    }
}

/// Resolved thresholds for every metric, as handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Utilization percentage
    pub utilization: TierThresholds,
    /// Loss percentage
    pub loss: TierThresholds,
    /// Jitter in milliseconds
    pub jitter: TierThresholds,
    /// Latency in milliseconds
    pub latency: TierThresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            utilization: TierThresholds::new(70.0, 80.0, 90.0),
            loss: TierThresholds::new(0.1, 0.5, 1.0),
            jitter: TierThresholds::new(10.0, 30.0, 50.0),
            latency: TierThresholds::new(50.0, 100.0, 150.0),
        }
    }
}

impl ThresholdConfig {
    pub fn tiers(&self, metric: Metric) -> &TierThresholds {
        match metric {
            Metric::Utilization => &self.utilization,
            Metric::Loss => &self.loss,
            Metric::Jitter => &self.jitter,
            Metric::Latency => &self.latency,
        }
    }

    pub fn tiers_mut(&mut self, metric: Metric) -> &mut TierThresholds {
        match metric {
            Metric::Utilization => &mut self.utilization,
            Metric::Loss => &mut self.loss,
            Metric::Jitter => &mut self.jitter,
            Metric::Latency => &mut self.latency,
        }
    }

    pub fn validate(&self) -> Result<()> {
        Metric::ALL
            .iter()
            .try_for_each(|metric| self.tiers(*metric).validate(*metric))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_uses_strict_inequality() {
        let tiers = TierThresholds::new(70.0, 80.0, 90.0);
        assert_eq!(tiers.classify(70.0), Severity::Normal);
        assert_eq!(tiers.classify(70.1), Severity::Warn);
        assert_eq!(tiers.classify(85.0), Severity::High);
        assert_eq!(tiers.classify(90.0), Severity::High);
        assert_eq!(tiers.classify(99.0), Severity::Critical);
    }

    #[test]
    fn test_severity_ordering_worst_wins() {
        let worst = [Severity::Normal, Severity::Critical, Severity::Warn]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, Severity::Critical);
        assert!(Severity::Unknown < Severity::Normal);
    }

    #[test]
    fn test_default_thresholds_are_valid() {
        let config = ThresholdConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers(Metric::Jitter).high, 30.0);
    }

    #[test]
    fn test_validate_rejects_inverted_tiers() {
        let tiers = TierThresholds::new(90.0, 80.0, 95.0);
        let err = tiers.validate(Metric::Utilization).unwrap_err();
        assert!(matches!(err, RollupError::InvalidThresholds { .. }));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let tiers = TierThresholds::new(f64::NAN, 80.0, 95.0);
        assert!(tiers.validate(Metric::Loss).is_err());
    }
}
