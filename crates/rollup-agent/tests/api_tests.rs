//! Integration tests for the rollup agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rollup_agent::{
    api::{create_router, AppState},
    config::AgentConfig,
};
use rollup_lib::{
    health::{components, HealthRegistry},
    threshold::{ThresholdOverrides, TierOverrides},
    CoordinatorConfig, ParallelMergeCoordinator, RollupMetrics, ThresholdProfile,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    setup_app_with(AgentConfig::default()).await
}

async fn setup_app_with(config: AgentConfig) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;
    health_registry.register(components::WORKER_POOL).await;

    let coordinator =
        ParallelMergeCoordinator::new(CoordinatorConfig::default().with_workers(2)).unwrap();
    let state = Arc::new(AppState::new(
        health_registry,
        RollupMetrics::new(),
        coordinator,
        &config,
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(app: Router, uri: &str, payload: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

/// 1 Mbps link; 225 MB in the busier direction is 50% of the hour
fn sample(site: &str, hour: &str, rx_bytes: i64, up_minutes: i32) -> Value {
    json!({
        "site_id": site,
        "circuit_id": "edge-1:wan0",
        "hour": hour,
        "rx_bytes": rx_bytes,
        "tx_bytes": 1_000,
        "bandwidth_bps": 1_000_000,
        "up_minutes": up_minutes,
        "quality": {
            "latency": { "avg": 20.0, "max": 35.0, "p95": 30.0 }
        }
    })
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["engine"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::WORKER_POOL, "3 units missed the merge deadline")
        .await;

    let (status, health) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::ENGINE, "merge diverged")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("circuit_rollup_samples_processed_total"));
    assert!(text.contains("circuit_rollup_workers"));
}

#[tokio::test]
async fn test_kpis_derive_utilization_and_flaps() {
    let (app, _state) = setup_test_app().await;

    let payload = json!({
        "samples": [
            sample("site-a", "2024060101", 225_000_000, 0),
            sample("site-a", "2024060100", 225_000_000, 60),
        ]
    });
    let (status, body) = post(app, "/v1/kpis", payload).await;

    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["hour"], "2024060100");
    assert!((records[0]["utilization_pct"].as_f64().unwrap() - 50.0).abs() < 1e-9);
    assert_eq!(records[0]["flap"], false);
    assert_eq!(records[1]["status"], "down");
    assert_eq!(records[1]["flap"], true);

    let health = body["health"].as_array().unwrap();
    assert_eq!(health.len(), 2);
    assert_eq!(health[0]["hour"], "2024060100");
    assert_eq!(health[0]["overall"], "normal");
}

#[tokio::test]
async fn test_kpis_health_uses_store_type_thresholds() {
    let mut config = AgentConfig::default();
    config.thresholds = ThresholdProfile::default().with_store_type_override(
        "kiosk",
        ThresholdOverrides {
            utilization: Some(TierOverrides {
                warn: Some(40.0),
                high: Some(45.0),
                critical: Some(48.0),
            }),
            ..Default::default()
        },
    );
    let (app, _state) = setup_app_with(config).await;

    let payload = json!({
        "store_type": "kiosk",
        "samples": [sample("site-a", "2024060100", 225_000_000, 60)]
    });
    let (status, body) = post(app, "/v1/kpis", payload).await;

    assert_eq!(status, StatusCode::OK);
    let hour = &body["health"][0];
    let utilization = hour["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["metric"] == "utilization")
        .unwrap();
    assert_eq!(utilization["severity"], "critical");
    assert_eq!(hour["overall"], "critical");
}

#[tokio::test]
async fn test_invalid_sample_returns_400() {
    let (app, state) = setup_test_app().await;

    let payload = json!({ "samples": [sample("site-a", "2024060100", -5, 60)] });
    let (status, body) = post(app, "/v1/kpis", payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("site-a"));

    // Rejected input is not an engine fault
    let health = state.health_registry.health().await;
    assert_eq!(health.status, rollup_lib::ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_out_of_range_quality_returns_400() {
    let (app, _state) = setup_test_app().await;

    let mut first = sample("site-a", "2024060100", 1_000, 60);
    first["quality"]["latency"] = json!({ "avg": 1e300, "max": 1e300, "p95": 1e300 });
    let mut second = sample("site-a", "2024060101", 1_000, 60);
    second["quality"]["latency"] = json!({ "avg": 1e300, "max": 1e300, "p95": 1e300 });
    let payload = json!({ "grain": "daily", "samples": [first, second] });
    let (status, body) = post(app, "/v1/rollups", payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert!(body["message"].as_str().unwrap().contains("latency avg exceeds"));
}

#[tokio::test]
async fn test_duplicate_sample_returns_400() {
    let (app, _state) = setup_test_app().await;

    let payload = json!({
        "samples": [
            sample("site-a", "2024060100", 1_000, 60),
            sample("site-a", "2024060100", 2_000, 60),
        ]
    });
    let (status, body) = post(app, "/v1/kpis", payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_malformed_hour_is_rejected() {
    let (app, _state) = setup_test_app().await;

    let payload = json!({ "samples": [sample("site-a", "2024-06-01T00", 1_000, 60)] });
    let (status, _body) = post(app, "/v1/kpis", payload).await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_daily_rollup_with_request_regions() {
    let (app, state) = setup_test_app().await;

    let payload = json!({
        "grain": "daily",
        "regions": { "site-a": "EMEA" },
        "samples": [
            sample("site-a", "2024060100", 225_000_000, 60),
            sample("site-a", "2024060101", 225_000_000, 30),
            sample("site-b", "2024060100", 0, 60),
        ]
    });
    let (status, report) = post(app, "/v1/rollups", payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["grain"], "daily");
    assert_eq!(report["hourly_records"].as_array().unwrap().len(), 3);

    let circuits = report["circuits"].as_array().unwrap();
    assert_eq!(circuits.len(), 2);
    assert_eq!(circuits[0]["site_id"], "site-a");
    assert_eq!(circuits[0]["period_key"], "20240601");
    assert!((circuits[0]["metrics"]["utilization_pct"].as_f64().unwrap() - 50.0).abs() < 1e-9);
    assert!((circuits[0]["metrics"]["availability_pct"].as_f64().unwrap() - 75.0).abs() < 1e-9);

    let regions: Vec<&str> = report["regions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["region"].as_str().unwrap())
        .collect();
    assert_eq!(regions, vec!["EMEA", "Unknown"]);

    let health = state.health_registry.health().await;
    assert_eq!(health.status, rollup_lib::ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_monthly_rollup_spans_days() {
    let (app, _state) = setup_test_app().await;

    let payload = json!({
        "grain": "monthly",
        "samples": [
            sample("site-a", "2024060100", 1_000, 60),
            sample("site-a", "2024061512", 1_000, 60),
            sample("site-a", "2024070100", 1_000, 60),
        ]
    });
    let (status, report) = post(app, "/v1/rollups", payload).await;

    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = report["circuits"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["period_key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["202406", "202407"]);
}

#[tokio::test]
async fn test_windows_report_breaches() {
    let (app, _state) = setup_test_app().await;

    // 95% utilization for three consecutive hours
    let busy = 427_500_000;
    let payload = json!({
        "reference_hour": "2024060102",
        "samples": [
            sample("site-a", "2024060100", busy, 60),
            sample("site-a", "2024060101", busy, 60),
            sample("site-a", "2024060102", busy, 60),
        ]
    });
    let (status, report) = post(app, "/v1/windows", payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["reference_hour"], "2024060102");

    let snapshots = report["circuits"][0]["snapshots"].as_array().unwrap();
    let sizes: Vec<u64> = snapshots.iter().map(|s| s["size"].as_u64().unwrap()).collect();
    assert_eq!(sizes, vec![3, 12, 24]);

    let three_hour = &snapshots[0];
    assert_eq!(three_hour["insufficient_data"], false);
    let critical = three_hour["breaches"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["metric"] == "utilization" && b["tier"] == "critical")
        .unwrap();
    assert_eq!(critical["result"]["continuous_hours"], 3);
    assert_eq!(critical["result"]["cumulative_hours"], 3);
}

#[tokio::test]
async fn test_windows_without_data_flag_insufficient() {
    let (app, _state) = setup_test_app().await;

    let payload = json!({
        "reference_hour": "2024070100",
        "samples": [sample("site-a", "2024060100", 1_000, 60)]
    });
    let (status, report) = post(app, "/v1/windows", payload).await;

    assert_eq!(status, StatusCode::OK);
    let snapshots = report["circuits"][0]["snapshots"].as_array().unwrap();
    assert!(snapshots.iter().all(|s| s["insufficient_data"] == true));
}

#[tokio::test]
async fn test_inconsistent_threshold_profile_is_server_error() {
    // Each override is valid alone; together they give 75 / 72 / 90
    let mut config = AgentConfig::default();
    config.thresholds = ThresholdProfile::default()
        .with_region_override(
            "EMEA",
            ThresholdOverrides {
                utilization: Some(TierOverrides { warn: Some(75.0), ..Default::default() }),
                ..Default::default()
            },
        )
        .with_store_type_override(
            "kiosk",
            ThresholdOverrides {
                utilization: Some(TierOverrides { high: Some(72.0), ..Default::default() }),
                ..Default::default()
            },
        );
    assert!(config.validate().is_err());
    let (app, state) = setup_app_with(config).await;

    let payload = json!({
        "reference_hour": "2024060100",
        "region": "EMEA",
        "store_type": "kiosk",
        "samples": [sample("site-a", "2024060100", 1_000, 60)]
    });
    let (status, body) = post(app, "/v1/windows", payload).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "invalid_thresholds");

    let health = state.health_registry.health().await;
    assert_eq!(health.status, rollup_lib::ComponentStatus::Healthy);
}
