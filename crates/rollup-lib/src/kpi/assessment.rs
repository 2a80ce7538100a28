//! Per-hour circuit health against resolved thresholds

use crate::models::{HourKey, HourlyKpiRecord, Metric};
use crate::threshold::{Severity, ThresholdConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricAssessment {
    pub metric: Metric,
    pub value: Option<f64>,
    pub severity: Severity,
}

/// Severity of every metric of one hourly record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitHealth {
    pub site_id: String,
    pub circuit_id: String,
    pub hour: HourKey,
    pub metrics: Vec<MetricAssessment>,
    /// Worst severity across metrics; `Unknown` only if nothing was reported
    pub overall: Severity,
}

impl CircuitHealth {
    pub fn severity(&self, metric: Metric) -> Severity {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| m.severity)
            .unwrap_or(Severity::Unknown)
    }
}

pub fn assess_record(record: &HourlyKpiRecord, thresholds: &ThresholdConfig) -> CircuitHealth {
    let metrics: Vec<MetricAssessment> = Metric::ALL
        .iter()
        .map(|&metric| {
            let value = record.metric_value(metric);
            let severity = value
                .map(|v| thresholds.tiers(metric).classify(v))
                .unwrap_or(Severity::Unknown);
            MetricAssessment { metric, value, severity }
        })
        .collect();

    let overall = metrics
        .iter()
        .map(|m| m.severity)
        .max()
        .unwrap_or(Severity::Unknown);

    CircuitHealth {
        site_id: record.site_id.clone(),
        circuit_id: record.circuit_id.clone(),
        hour: record.hour,
        metrics,
        overall,
    }
}
