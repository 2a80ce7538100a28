//! HTTP API for rollup computation, health checks and Prometheus metrics

use crate::config::AgentConfig;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use rollup_lib::{
    assess_record, threshold::ThresholdTier, CircuitHealth, ComponentStatus, Grain,
    HealthRegistry, HourKey, HourlyKpiRecord, HourlySample, MergeOutcome, Metric,
    ParallelMergeCoordinator, RegionMap, RollupError, RollupMetrics, RollupReport,
    StructuredLogger, ThresholdConfig, ThresholdProfile, WindowReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Request bodies carry whole batches
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: RollupMetrics,
    pub logger: StructuredLogger,
    pub coordinator: Arc<ParallelMergeCoordinator>,
    pub thresholds: ThresholdProfile,
    pub regions: RegionMap,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: RollupMetrics,
        coordinator: ParallelMergeCoordinator,
        config: &AgentConfig,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger: StructuredLogger::new(&config.instance_name),
            coordinator: Arc::new(coordinator),
            thresholds: config.thresholds.clone(),
            regions: config.regions.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KpiRequest {
    pub samples: Vec<HourlySample>,
    /// Region and store type select threshold overrides for `health`
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub store_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KpiResponse {
    pub records: Vec<HourlyKpiRecord>,
    /// Per-hour severity of every metric, in record order
    pub health: Vec<CircuitHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RollupRequest {
    pub samples: Vec<HourlySample>,
    pub grain: Grain,
    /// Replaces the configured site to region mapping
    #[serde(default)]
    pub regions: Option<RegionMap>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowRequest {
    pub samples: Vec<HourlySample>,
    pub reference_hour: HourKey,
    /// Region and store type select threshold overrides
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub store_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Failure of an API call
#[derive(Debug)]
pub enum ApiError {
    Engine(RollupError),
    Internal(String),
}

impl From<RollupError> for ApiError {
    fn from(err: RollupError) -> Self {
        ApiError::Engine(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(RollupError::MissingData { .. }) => StatusCode::NOT_FOUND,
            ApiError::Engine(err) if err.is_caller_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Engine(err) => ErrorBody {
                error: err.kind().to_string(),
                message: err.to_string(),
            },
            ApiError::Internal(message) => ErrorBody {
                error: "internal".to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Engine entry points served by the API
#[derive(Debug, Clone, Copy)]
enum Job {
    Kpis,
    Rollups(Grain),
    Windows,
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::Kpis => "kpis",
            Job::Rollups(_) => "rollups",
            Job::Windows => "windows",
        }
    }
}

/// Run an engine call off the async runtime and record its outcome
async fn run_engine<T, F>(state: &AppState, job: Job, samples: usize, compute: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ParallelMergeCoordinator) -> rollup_lib::Result<MergeOutcome<T>> + Send + 'static,
{
    let coordinator = Arc::clone(&state.coordinator);
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || compute(&coordinator))
        .await
        .map_err(|e| {
            error!(job = job.name(), error = %e, "Engine task failed");
            ApiError::Internal(format!("engine task failed: {e}"))
        })?;
    let elapsed = started.elapsed().as_secs_f64();

    state.health_registry.record_outcome(&result).await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            state.metrics.record_error(&err);
            state.logger.log_rejected(&err);
            return Err(err.into());
        }
    };

    state.metrics.record_outcome(&outcome);
    state.metrics.add_samples_processed(samples);
    match job {
        Job::Windows => state.metrics.observe_window_latency(elapsed),
        Job::Rollups(grain) => {
            state.metrics.observe_rollup_latency(elapsed);
            state.metrics.inc_rollups(grain.as_str());
        }
        Job::Kpis => state.metrics.observe_rollup_latency(elapsed),
    }
    if outcome.fallback_units > 0 {
        state
            .logger
            .log_deadline_fallback(outcome.fallback_units, outcome.partitions);
    }
    state
        .logger
        .log_rollup_completed(job.name(), samples, outcome.partitions, elapsed);

    Ok(outcome.value)
}

/// Resolve thresholds from the configured profile
///
/// Failure means the profile itself is inconsistent and maps to a 500.
fn resolve_thresholds(
    state: &AppState,
    region: Option<&str>,
    store_type: Option<&str>,
) -> Result<ThresholdConfig, ApiError> {
    state.thresholds.resolve(region, store_type).map_err(|err| {
        error!(
            region = region.unwrap_or("-"),
            store_type = store_type.unwrap_or("-"),
            error = %err,
            "Configured threshold profile does not resolve"
        );
        ApiError::from(err)
    })
}

/// Log the highest breached tier of every metric in every snapshot
fn log_breaches(logger: &StructuredLogger, report: &WindowReport) {
    for snapshot in report.circuits.iter().flat_map(|c| &c.snapshots) {
        for metric in Metric::ALL {
            let worst = ThresholdTier::ALL.iter().rev().find_map(|tier| {
                snapshot
                    .breach(metric, *tier)
                    .filter(|result| result.breached())
                    .map(|result| (*tier, result))
            });
            if let Some((tier, result)) = worst {
                logger.log_breach(
                    &snapshot.site_id,
                    &snapshot.circuit_id,
                    metric,
                    tier,
                    result.continuous_hours,
                    result.cumulative_hours,
                );
            }
        }
    }
}

/// Hourly KPI records for a batch of samples
async fn compute_kpis(
    State(state): State<Arc<AppState>>,
    Json(request): Json<KpiRequest>,
) -> Result<Json<KpiResponse>, ApiError> {
    let KpiRequest {
        samples,
        region,
        store_type,
    } = request;
    let thresholds = resolve_thresholds(&state, region.as_deref(), store_type.as_deref())?;

    let response = run_engine(&state, Job::Kpis, samples.len(), move |coordinator| {
        let outcome = coordinator.compute_kpis(&samples)?;
        Ok(outcome.map(|records| {
            let health = records
                .iter()
                .map(|record| assess_record(record, &thresholds))
                .collect();
            KpiResponse { records, health }
        }))
    })
    .await?;
    Ok(Json(response))
}

/// Calendar and region rollups for a batch of samples
async fn compute_rollups(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RollupRequest>,
) -> Result<Json<RollupReport>, ApiError> {
    let RollupRequest {
        samples,
        grain,
        regions,
    } = request;
    let regions = regions.unwrap_or_else(|| state.regions.clone());
    let tiers = resolve_thresholds(&state, None, None)?.utilization;

    let report = run_engine(&state, Job::Rollups(grain), samples.len(), move |coordinator| {
        coordinator.compute_rollups(&samples, grain, &regions, &tiers)
    })
    .await?;
    Ok(Json(report))
}

/// Rolling window snapshots ending at the reference hour
async fn compute_windows(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WindowRequest>,
) -> Result<Json<WindowReport>, ApiError> {
    let WindowRequest {
        samples,
        reference_hour,
        region,
        store_type,
    } = request;
    let thresholds = resolve_thresholds(&state, region.as_deref(), store_type.as_deref())?;

    let report = run_engine(&state, Job::Windows, samples.len(), move |coordinator| {
        coordinator.compute_windows(&samples, reference_hour, &thresholds)
    })
    .await?;
    log_breaches(&state.logger, &report);
    Ok(Json(report))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {e}")))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/kpis", post(compute_kpis))
        .route("/v1/rollups", post(compute_rollups))
        .route("/v1/windows", post(compute_windows))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
