//! Agent configuration
//!
//! Read from an optional `rollup-agent.{toml,yaml,json}` file and from
//! `ROLLUP_`-prefixed environment variables, with `__` separating nested
//! keys (`ROLLUP_THRESHOLDS__DEFAULTS__LATENCY__WARN=80`).

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use rollup_lib::calendar::RegionMap;
use rollup_lib::{CoordinatorConfig, ThresholdProfile};
use serde::Deserialize;
use std::time::Duration;

/// Default configuration file name, without extension
pub const CONFIG_FILE: &str = "rollup-agent";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the compute, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Worker threads for the merge coordinator
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Budget for workers before remaining units run on the caller
    #[serde(default)]
    pub merge_deadline_ms: Option<u64>,

    /// Recompute every parallel merge sequentially and compare
    #[serde(default)]
    pub verify_merge: bool,

    #[serde(default)]
    pub thresholds: ThresholdProfile,

    /// Site id to region mapping used when a request carries none
    #[serde(default)]
    pub regions: RegionMap,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "rollup-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    CoordinatorConfig::default().workers
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            workers: default_workers(),
            merge_deadline_ms: None,
            verify_merge: false,
            thresholds: ThresholdProfile::default(),
            regions: RegionMap::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("ROLLUP")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    /// Deserialize and validate whatever sources `builder` carries
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: AgentConfig = builder
            .build()
            .context("failed to read configuration sources")?
            .try_deserialize()
            .context("failed to deserialize agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.workers > 0, "workers must be at least 1");
        self.thresholds
            .validate()
            .context("invalid threshold profile")?;
        Ok(())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let config = CoordinatorConfig::default()
            .with_workers(self.workers)
            .with_verify_merge(self.verify_merge);
        match self.merge_deadline_ms {
            Some(ms) => config.with_deadline(Duration::from_millis(ms)),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<AgentConfig> {
        AgentConfig::from_builder(
            config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = from_toml("").unwrap();
        assert_eq!(config.api_port, 8080);
        assert!(config.workers >= 1);
        assert!(!config.verify_merge);
        assert_eq!(config.coordinator_config().deadline, None);
    }

    #[test]
    fn test_file_values_and_overrides() {
        let config = from_toml(
            r#"
            api_port = 9100
            workers = 3
            merge_deadline_ms = 250
            verify_merge = true

            [thresholds.defaults.latency]
            warn = 40.0
            high = 80.0
            critical = 120.0

            [thresholds.store_type_overrides.flagship.utilization]
            warn = 60.0

            [regions]
            site-001 = "EMEA"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 9100);
        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.workers, 3);
        assert_eq!(coordinator.deadline, Some(Duration::from_millis(250)));
        assert!(coordinator.verify_merge);

        let resolved = config.thresholds.resolve(None, Some("flagship")).unwrap();
        assert_eq!(resolved.latency.warn, 40.0);
        assert_eq!(resolved.utilization.warn, 60.0);
        assert_eq!(config.regions.region_of("site-001"), "EMEA");
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = from_toml(
            r#"
            [thresholds.region_overrides.EMEA.loss]
            warn = 5.0
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("loss"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(from_toml("workers = 0").is_err());
    }
}
