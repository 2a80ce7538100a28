//! Rollup Agent - circuit network-sample rollup service
//!
//! Serves hourly KPI, calendar rollup and rolling window computations over
//! HTTP, next to health and Prometheus endpoints.

use anyhow::{Context, Result};
use rollup_agent::{api, config::AgentConfig};
use rollup_lib::{
    health::{components, HealthRegistry},
    ParallelMergeCoordinator, RollupMetrics, StructuredLogger,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting rollup-agent");

    let config = AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        workers = config.workers,
        regions = config.regions.len(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::WORKER_POOL).await;

    let coordinator = ParallelMergeCoordinator::new(config.coordinator_config())
        .context("failed to start worker pool")?;

    let metrics = RollupMetrics::new();
    metrics.set_workers(coordinator.workers());

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION, coordinator.workers());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        coordinator,
        &config,
    ));

    // Engine is stateless, ready once the pool is up
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            result.context("API server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }
    info!("Shutting down");

    Ok(())
}
