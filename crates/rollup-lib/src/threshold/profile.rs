//! Threshold profiles with per-region and per-store-type overrides
//!
//! Resolution priority is store type, then region, then defaults. The engine
//! itself only ever sees the resolved [`ThresholdConfig`].

use super::{ThresholdConfig, TierThresholds};
use crate::error::Result;
use crate::models::Metric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Partial override of one metric's tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierOverrides {
    pub warn: Option<f64>,
    pub high: Option<f64>,
    pub critical: Option<f64>,
}

impl TierOverrides {
    fn apply(&self, tiers: &mut TierThresholds) {
        if let Some(warn) = self.warn {
            tiers.warn = warn;
        }
        if let Some(high) = self.high {
            tiers.high = high;
        }
        if let Some(critical) = self.critical {
            tiers.critical = critical;
        }
    }
}

/// Overrides for any subset of metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub utilization: Option<TierOverrides>,
    pub loss: Option<TierOverrides>,
    pub jitter: Option<TierOverrides>,
    pub latency: Option<TierOverrides>,
}

impl ThresholdOverrides {
    fn get(&self, metric: Metric) -> Option<&TierOverrides> {
        match metric {
            Metric::Utilization => self.utilization.as_ref(),
            Metric::Loss => self.loss.as_ref(),
            Metric::Jitter => self.jitter.as_ref(),
            Metric::Latency => self.latency.as_ref(),
        }
    }

    fn apply(&self, config: &mut ThresholdConfig) {
        for metric in Metric::ALL {
            if let Some(overrides) = self.get(metric) {
                overrides.apply(config.tiers_mut(metric));
            }
        }
    }
}

/// Default thresholds plus region and store-type overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdProfile {
    pub defaults: ThresholdConfig,
    pub region_overrides: HashMap<String, ThresholdOverrides>,
    pub store_type_overrides: HashMap<String, ThresholdOverrides>,
}

impl ThresholdProfile {
    pub fn new(defaults: ThresholdConfig) -> Self {
        Self {
            defaults,
            ..Default::default()
        }
    }

    pub fn with_region_override(mut self, region: impl Into<String>, overrides: ThresholdOverrides) -> Self {
        self.region_overrides.insert(region.into(), overrides);
        self
    }

    pub fn with_store_type_override(mut self, store_type: impl Into<String>, overrides: ThresholdOverrides) -> Self {
        self.store_type_overrides.insert(store_type.into(), overrides);
        self
    }

    /// Resolve the thresholds for a site and validate the result
    pub fn resolve(&self, region: Option<&str>, store_type: Option<&str>) -> Result<ThresholdConfig> {
        let mut config = self.defaults;
        if let Some(overrides) = region.and_then(|r| self.region_overrides.get(r)) {
            overrides.apply(&mut config);
        }
        if let Some(overrides) = store_type.and_then(|s| self.store_type_overrides.get(s)) {
            overrides.apply(&mut config);
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate defaults, every override on its own and every region and
    /// store type pair
    pub fn validate(&self) -> Result<()> {
        self.resolve(None, None)?;
        for region in self.region_overrides.keys() {
            self.resolve(Some(region), None)?;
        }
        for store_type in self.store_type_overrides.keys() {
            self.resolve(None, Some(store_type))?;
            for region in self.region_overrides.keys() {
                self.resolve(Some(region), Some(store_type))?;
            }
        }
        Ok(())
    }
}
