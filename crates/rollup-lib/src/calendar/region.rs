//! Region rollups over circuit aggregates
//!
//! The site to region mapping is read-only and shared between workers.
//! Sites missing from the mapping roll into [`UNKNOWN_REGION`].

use super::aggregator::CalendarAggregate;
use super::period::{Grain, Period};
use super::totals::{AggregateMetrics, RollupTotals};
use crate::merge::Merge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Region assigned to sites with no mapping
pub const UNKNOWN_REGION: &str = "Unknown";

/// Immutable site id to region lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct RegionMap {
    sites: Arc<HashMap<String, String>>,
}

impl RegionMap {
    pub fn new(sites: HashMap<String, String>) -> Self {
        Self {
            sites: Arc::new(sites),
        }
    }

    pub fn region_of(&self, site_id: &str) -> &str {
        self.sites
            .get(site_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_REGION)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl From<HashMap<String, String>> for RegionMap {
    fn from(sites: HashMap<String, String>) -> Self {
        Self::new(sites)
    }
}

impl From<RegionMap> for HashMap<String, String> {
    fn from(map: RegionMap) -> Self {
        Arc::try_unwrap(map.sites).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl<S: Into<String>, R: Into<String>> FromIterator<(S, R)> for RegionMap {
    fn from_iter<I: IntoIterator<Item = (S, R)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(s, r)| (s.into(), r.into())).collect())
    }
}

/// Rollup of every circuit of a region over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAggregate {
    pub region: String,
    pub grain: Grain,
    pub period: Period,
    pub period_key: String,
    /// Sites that contributed, by id only
    pub site_ids: BTreeSet<String>,
    pub circuit_count: usize,
    pub totals: RollupTotals,
    pub metrics: AggregateMetrics,
}

impl RegionAggregate {
    fn from_circuit(region: &str, aggregate: &CalendarAggregate) -> Self {
        Self {
            region: region.to_string(),
            grain: aggregate.grain,
            period: aggregate.period,
            period_key: aggregate.period_key.clone(),
            site_ids: BTreeSet::from([aggregate.site_id.clone()]),
            circuit_count: 1,
            totals: aggregate.totals.clone(),
            metrics: aggregate.metrics,
        }
    }
}

impl Merge for RegionAggregate {
    fn merge(&mut self, other: Self) {
        self.site_ids.extend(other.site_ids);
        self.circuit_count += other.circuit_count;
        self.totals.merge(other.totals);
        self.metrics = AggregateMetrics::from(&self.totals);
    }
}

/// Region aggregates keyed by region and period
pub type RegionBuckets = BTreeMap<(String, Period), RegionAggregate>;

#[derive(Debug, Clone, Default)]
pub struct RegionAggregator {
    regions: RegionMap,
}

impl RegionAggregator {
    pub fn new(regions: RegionMap) -> Self {
        Self { regions }
    }

    pub fn region_map(&self) -> &RegionMap {
        &self.regions
    }

    pub fn bucket<'a, I>(&self, aggregates: I) -> RegionBuckets
    where
        I: IntoIterator<Item = &'a CalendarAggregate>,
    {
        let mut buckets = RegionBuckets::new();
        for aggregate in aggregates {
            let region = self.regions.region_of(&aggregate.site_id);
            let partial = RegionAggregate::from_circuit(region, aggregate);
            buckets.merge(BTreeMap::from([((region.to_string(), aggregate.period), partial)]));
        }
        buckets
    }

    /// Roll circuit aggregates into region aggregates, ordered by region and period
    pub fn roll_up(&self, aggregates: &[CalendarAggregate]) -> Vec<RegionAggregate> {
        self.bucket(aggregates).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarAggregator;
    use crate::kpi::KpiCalculator;
    use crate::models::{HourKey, HourlySample, QualityStats};

    fn samples(site: &str, circuit: &str, scale: i64) -> Vec<HourlySample> {
        let start: HourKey = "2024030100".parse().unwrap();
        (0..24)
            .map(|h| HourlySample {
                site_id: site.into(),
                circuit_id: circuit.into(),
                hour: start.offset(h),
                rx_bytes: scale * (h + 1),
                tx_bytes: scale * (24 - h),
                bandwidth_bps: 1_000_000 * scale,
                up_minutes: if h == 5 { 30 } else { 60 },
                quality: QualityStats::default(),
            })
            .collect()
    }

    #[test]
    fn test_unmapped_site_rolls_into_unknown() {
        let map: RegionMap = [("site-a", "EMEA")].into_iter().collect();
        assert_eq!(map.region_of("site-a"), "EMEA");
        assert_eq!(map.region_of("site-z"), UNKNOWN_REGION);
    }

    #[test]
    fn test_region_equals_pooled_circuits() {
        let mut all = samples("site-a", "dev:wan0", 3);
        all.extend(samples("site-b", "dev:wan0", 7));
        let records = KpiCalculator::new().derive_records(&all).unwrap();
        let calendar = CalendarAggregator::default();
        let daily = calendar.roll_up_hourly(&records, Grain::Daily);

        let map: RegionMap = [("site-a", "EMEA"), ("site-b", "EMEA")].into_iter().collect();
        let regions = RegionAggregator::new(map).roll_up(&daily);
        assert_eq!(regions.len(), 1);

        let region = &regions[0];
        let mut pooled = RollupTotals::from_records(&records, &crate::threshold::ThresholdConfig::default().utilization);
        // The region p95 is the max over circuit days rather than a p95 of pooled hours
        pooled.utilization.p95_max = daily.iter().filter_map(|d| d.metrics.utilization.p95).reduce(f64::max);
        pooled.utilization.p95_sources = 2;
        assert_eq!(region.totals, pooled);
        assert!(region.metrics.utilization.p95_approximate);
        assert_eq!(region.metrics, AggregateMetrics::from(&pooled));
        assert_eq!(region.circuit_count, 2);
        assert_eq!(
            region.site_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["site-a", "site-b"]
        );
    }

    #[test]
    fn test_regions_split_by_mapping() {
        let mut all = samples("site-a", "dev:wan0", 1);
        all.extend(samples("site-b", "dev:wan0", 1));
        all.extend(samples("site-c", "dev:wan0", 1));
        let records = KpiCalculator::new().derive_records(&all).unwrap();
        let daily = CalendarAggregator::default().roll_up_hourly(&records, Grain::Daily);

        let map: RegionMap = [("site-a", "EMEA"), ("site-b", "APAC")].into_iter().collect();
        let regions = RegionAggregator::new(map).roll_up(&daily);
        let names: Vec<_> = regions.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(names, vec!["APAC", "EMEA", UNKNOWN_REGION]);
    }

    #[test]
    fn test_region_map_serde() {
        let map: RegionMap = serde_json::from_str(r#"{"site-a":"EMEA"}"#).unwrap();
        assert_eq!(map.region_of("site-a"), "EMEA");
        assert_eq!(map.len(), 1);
    }
}
