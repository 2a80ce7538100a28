//! Core data models for the rollup engine

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in the fixed hourly sampling interval
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Minutes in the fixed hourly sampling interval
pub const MINUTES_PER_HOUR: u32 = 60;

/// A UTC calendar hour, written `YYYYMMDDHH` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HourKey(DateTime<Utc>);

impl HourKey {
    /// Truncate a timestamp to the hour that contains it
    pub fn containing(ts: DateTime<Utc>) -> Self {
        let secs = ts.timestamp().div_euclid(SECONDS_PER_HOUR as i64) * SECONDS_PER_HOUR as i64;
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or(ts))
    }

    pub fn from_ymdh(year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)?;
        Some(Self(Utc.from_utc_datetime(&naive)))
    }

    /// Hour `hours` later (or earlier when negative)
    pub fn offset(self, hours: i64) -> Self {
        Self(self.0 + Duration::hours(hours))
    }

    pub fn next(self) -> Self {
        self.offset(1)
    }

    /// Whole hours from `earlier` to `self`
    pub fn hours_since(self, earlier: HourKey) -> i64 {
        (self.0 - earlier.0).num_hours()
    }

    pub fn date(self) -> NaiveDate {
        self.0.date_naive()
    }

    pub fn hour_of_day(self) -> u32 {
        self.0.hour()
    }

    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d%H"))
    }
}

impl FromStr for HourKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("hour key must be YYYYMMDDHH, got {s:?}"));
        }
        let field = |range: std::ops::Range<usize>| s[range].parse::<u32>().unwrap_or(u32::MAX);
        let year = s[0..4].parse::<i32>().map_err(|e| e.to_string())?;
        HourKey::from_ymdh(year, field(4..6), field(6..8), field(8..10))
            .ok_or_else(|| format!("hour key {s:?} is not a calendar hour"))
    }
}

impl TryFrom<String> for HourKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HourKey> for String {
    fn from(key: HourKey) -> Self {
        key.to_string()
    }
}

/// Identity of a single circuit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CircuitKey {
    pub site_id: String,
    pub circuit_id: String,
}

impl CircuitKey {
    pub fn new(site_id: impl Into<String>, circuit_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            circuit_id: circuit_id.into(),
        }
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site_id, self.circuit_id)
    }
}

/// Metrics that thresholds and breach analysis apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Utilization,
    Loss,
    Jitter,
    Latency,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Utilization, Metric::Loss, Metric::Jitter, Metric::Latency];

    pub const QUALITY: [Metric; 3] = [Metric::Loss, Metric::Jitter, Metric::Latency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Utilization => "utilization",
            Metric::Loss => "loss",
            Metric::Jitter => "jitter",
            Metric::Latency => "latency",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Largest accepted quality statistic; loss, jitter and latency are far below it
pub const MAX_QUALITY_VALUE: f64 = 1_000_000.0;

/// Upstream per-hour statistic for one quality metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: f64,
    pub max: f64,
    pub p95: f64,
}

/// Quality statistics for an hour; `None` means the metric was not reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    #[serde(default)]
    pub loss: Option<MetricStats>,
    #[serde(default)]
    pub jitter: Option<MetricStats>,
    #[serde(default)]
    pub latency: Option<MetricStats>,
}

impl QualityStats {
    pub fn get(&self, metric: Metric) -> Option<&MetricStats> {
        match metric {
            Metric::Utilization => None,
            Metric::Loss => self.loss.as_ref(),
            Metric::Jitter => self.jitter.as_ref(),
            Metric::Latency => self.latency.as_ref(),
        }
    }
}

/// Raw hourly sample as delivered by the collection layer
///
/// Integer fields are signed so malformed upstream values reach validation
/// instead of being rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySample {
    pub site_id: String,
    pub circuit_id: String,
    pub hour: HourKey,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub bandwidth_bps: i64,
    pub up_minutes: i32,
    #[serde(default)]
    pub quality: QualityStats,
}

impl HourlySample {
    pub fn circuit_key(&self) -> CircuitKey {
        CircuitKey::new(&self.site_id, &self.circuit_id)
    }
}

/// Hourly up/down status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitStatus {
    Up,
    Down,
}

impl CircuitStatus {
    pub fn from_up_minutes(up_minutes: u32) -> Self {
        if up_minutes > 0 {
            CircuitStatus::Up
        } else {
            CircuitStatus::Down
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitStatus::Up => write!(f, "up"),
            CircuitStatus::Down => write!(f, "down"),
        }
    }
}

/// Derived per-hour KPIs, carrying the validated raw quantities they came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyKpiRecord {
    pub site_id: String,
    pub circuit_id: String,
    pub hour: HourKey,
    pub utilization_pct: f64,
    pub availability_pct: f64,
    pub status: CircuitStatus,
    pub flap: bool,
    pub flap_count: u32,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub bandwidth_bps: u64,
    pub up_minutes: u32,
    pub quality: QualityStats,
}

impl HourlyKpiRecord {
    pub fn circuit_key(&self) -> CircuitKey {
        CircuitKey::new(&self.site_id, &self.circuit_id)
    }

    /// Warehouse primary key: `site|circuit|YYYYMMDDHH`
    pub fn primary_key(&self) -> String {
        format!("{}|{}|{}", self.site_id, self.circuit_id, self.hour)
    }

    /// Bytes moved in the busier direction
    pub fn peak_bytes(&self) -> u64 {
        self.rx_bytes.max(self.tx_bytes)
    }

    /// Capacity of the hour in bits
    pub fn capacity_bits(&self) -> u128 {
        self.bandwidth_bps as u128 * SECONDS_PER_HOUR as u128
    }

    /// Per-hour value of `metric`; quality metrics use the hourly average
    pub fn metric_value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Utilization => Some(self.utilization_pct),
            _ => self.quality.get(metric).map(|stats| stats.avg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_key_round_trip_text() {
        let key: HourKey = "2024013123".parse().unwrap();
        assert_eq!(key.to_string(), "2024013123");
        assert_eq!(key.next().to_string(), "2024020100");
        assert_eq!(key.offset(-23).to_string(), "2024013100");
        assert_eq!(key.hour_of_day(), 23);
    }

    #[test]
    fn test_hour_key_rejects_malformed() {
        assert!("20240101".parse::<HourKey>().is_err());
        assert!("2024010124".parse::<HourKey>().is_err());
        assert!("2024023012".parse::<HourKey>().is_err());
        assert!("2024x10112".parse::<HourKey>().is_err());
    }

    #[test]
    fn test_hour_key_serde_uses_text_form() {
        let key = HourKey::from_ymdh(2024, 3, 5, 7).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024030507\"");
        let parsed: HourKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_hour_key_containing_truncates() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 13, 59, 59).unwrap();
        assert_eq!(HourKey::containing(ts).to_string(), "2024060113");
    }

    #[test]
    fn test_hours_since() {
        let a: HourKey = "2024010100".parse().unwrap();
        let b: HourKey = "2024010203".parse().unwrap();
        assert_eq!(b.hours_since(a), 27);
    }

    #[test]
    fn test_absent_quality_deserializes_as_none() {
        let json = r#"{"site_id":"s","circuit_id":"c","hour":"2024010100",
            "rx_bytes":1,"tx_bytes":2,"bandwidth_bps":1000,"up_minutes":60,
            "quality":{"loss":null,"jitter":{"avg":1.0,"max":2.0,"p95":1.5}}}"#;
        let sample: HourlySample = serde_json::from_str(json).unwrap();
        assert!(sample.quality.loss.is_none());
        assert!(sample.quality.latency.is_none());
        assert_eq!(sample.quality.jitter.unwrap().p95, 1.5);
    }

    #[test]
    fn test_primary_key_format() {
        let record = HourlyKpiRecord {
            site_id: "site-001".into(),
            circuit_id: "device:port".into(),
            hour: "2024010112".parse().unwrap(),
            utilization_pct: 0.0,
            availability_pct: 100.0,
            status: CircuitStatus::Up,
            flap: false,
            flap_count: 0,
            rx_bytes: 0,
            tx_bytes: 0,
            bandwidth_bps: 1,
            up_minutes: 60,
            quality: QualityStats::default(),
        };
        assert_eq!(record.primary_key(), "site-001|device:port|2024010112");
    }
}
