//! HTTP surface of the pulse daemon.
//!
//! Thin layer over [`IngestPipeline`]: extract, call into the core, map
//! errors onto status codes. All handlers share one [`AppState`].

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pulse_core::observability::health::HealthStatus;
use pulse_core::{HealthChecker, IngestPipeline, MetricSnapshot, PulseError, Result};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, instrument};

use crate::api::ws;

/// Header agents present the shared ingest token in.
pub const AGENT_TOKEN_HEADER: &str = "x-agent-token";

/// State shared by every handler.
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub health: HealthChecker,
    /// True when durable storage is configured, even if it failed to open.
    /// Distinguishes "disconnected" from "disabled" in health output.
    pub storage_configured: bool,
}

pub type SharedState = Arc<AppState>;

/// Build the daemon router. Split out from [`start_api_server`] so tests
/// can drive it without binding a listener.
pub fn build_router(state: SharedState) -> Router {
    // The dashboard is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ingest/metrics", post(ingest_metrics))
        .route("/api/metrics/recent", get(recent_metrics))
        .route("/api/alerts/recent", get(recent_alerts))
        .route("/ws/metrics", get(ws::metrics_stream))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the shutdown broadcast fires, then drain.
#[instrument(skip(state, shutdown))]
pub async fn start_api_server(
    addr: String,
    state: SharedState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PulseError::InvalidConfig {
            reason: format!("cannot bind {}: {}", addr, e),
        })?;
    info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
        info!("API server draining");
    })
    .await
    .map_err(|e| PulseError::Other(anyhow::anyhow!("API server failed: {}", e)))?;

    Ok(())
}

/// POST /ingest/metrics - admit one agent snapshot.
#[instrument(skip(state, headers, snapshot), fields(source = %addr.ip()))]
async fn ingest_metrics(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(snapshot): Json<MetricSnapshot>,
) -> Response {
    let token = headers
        .get(AGENT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let source = addr.ip().to_string();

    match state.pipeline.ingest(token, &source, snapshot).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({ "status": "accepted", "timestamp": receipt.timestamp })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/metrics/recent - rolling window contents, ascending by timestamp.
async fn recent_metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let held = state.pipeline.window().recent().await;
    let snapshots: Vec<&MetricSnapshot> = held.iter().map(|s| s.as_ref()).collect();
    Json(json!(snapshots))
}

/// GET /api/alerts/recent - alert transitions, oldest first.
async fn recent_alerts(State(state): State<SharedState>) -> impl IntoResponse {
    let events = state.pipeline.alerts().recent_events().await;
    Json(events)
}

/// GET /health - aggregate and per-subsystem health.
///
/// Always 200. A dead database shows up as degraded in the body, never as
/// an error status; pollers need to observe the transition, and agents
/// keep posting regardless.
async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let storage = match state.pipeline.store() {
        Some(store) => match store.ping().await {
            Ok(()) => {
                state
                    .health
                    .update_subsystem("storage", HealthStatus::Healthy, None)
                    .await;
                "connected"
            }
            Err(e) => {
                state
                    .health
                    .update_subsystem("storage", HealthStatus::Degraded, Some(e.to_string()))
                    .await;
                "disconnected"
            }
        },
        // Configured but the open failed at startup; the degraded subsystem
        // entry was recorded there.
        None if state.storage_configured => "disconnected",
        None => "disabled",
    };

    let report = state.health.get_health().await;
    let window_entries = state.pipeline.window().len().await;

    Json(json!({
        "status": report.status,
        "version": report.version,
        "storage": storage,
        "window_entries": window_entries,
        "subsystems": report.subsystems,
    }))
}

/// Map pipeline errors onto HTTP status codes.
fn error_response(err: PulseError) -> Response {
    let status = match &err {
        PulseError::Validation { .. } => StatusCode::BAD_REQUEST,
        PulseError::Unauthorized => StatusCode::UNAUTHORIZED,
        PulseError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use pulse_core::config::AlertRuleConfig;
    use pulse_core::{AlertMetric, Config, DurableStore, SqliteMetricsStore};
    use tower::ServiceExt;

    async fn test_state(config: &Config, store: Option<Arc<dyn DurableStore>>) -> SharedState {
        let health = HealthChecker::new();
        health.register_subsystem("storage".to_string()).await;
        Arc::new(AppState {
            pipeline: Arc::new(IngestPipeline::new(config, store.clone())),
            health,
            storage_configured: store.is_some(),
        })
    }

    fn test_app(state: SharedState) -> Router {
        build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4242))))
    }

    fn snapshot_body(timestamp: i64, cpu: f64) -> String {
        json!({
            "timestamp": timestamp,
            "total_cpu_percent": cpu,
            "per_core_cpu_percent": [cpu],
            "system_memory_total_mb": 16384.0,
            "system_memory_used_mb": 8192.0,
            "top_processes": [],
        })
        .to_string()
    }

    fn ingest_request(body: String, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/ingest/metrics")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(AGENT_TOKEN_HEADER, token);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_returns_acceptance_ack() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state);

        let response = app
            .oneshot(ingest_request(snapshot_body(100, 40.0), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["timestamp"], 100);
    }

    #[tokio::test]
    async fn test_ingest_requires_token_when_configured() {
        let mut config = Config::default();
        config.ingest.shared_token = Some("sekrit".to_string());
        let state = test_state(&config, None).await;
        let app = test_app(state);

        let response = app
            .clone()
            .oneshot(ingest_request(snapshot_body(1, 10.0), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(ingest_request(snapshot_body(2, 10.0), Some("nope")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(ingest_request(snapshot_body(3, 10.0), Some("sekrit")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_rate_limit_gives_429() {
        let mut config = Config::default();
        config.ingest.rate_limit_per_minute = 2;
        let state = test_state(&config, None).await;
        let app = test_app(state);

        for timestamp in 1..=2 {
            let response = app
                .clone()
                .oneshot(ingest_request(snapshot_body(timestamp, 10.0), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(ingest_request(snapshot_body(3, 10.0), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_payload_rejected_with_400() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state.clone());

        let response = app
            .oneshot(ingest_request(snapshot_body(1, 150.0), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.pipeline.window().is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_field_rejected_by_deserialization() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state);

        let response = app
            .oneshot(ingest_request(json!({ "timestamp": 1 }).to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_recent_metrics_returns_window_ascending() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state);

        for timestamp in [30, 10, 20] {
            let response = app
                .clone()
                .oneshot(ingest_request(snapshot_body(timestamp, 25.0), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(get_request("/api/metrics/recent"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let timestamps: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["timestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_recent_alerts_lists_transitions() {
        let mut config = Config::default();
        config.alerts.rules = vec![AlertRuleConfig {
            name: "hot".to_string(),
            metric: AlertMetric::TotalCpuPercent,
            threshold: 90.0,
            duration_seconds: 0,
        }];
        let state = test_state(&config, None).await;
        let app = test_app(state);

        for (timestamp, cpu) in [(1, 95.0), (2, 50.0)] {
            let response = app
                .clone()
                .oneshot(ingest_request(snapshot_body(timestamp, cpu), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(get_request("/api/alerts/recent"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let events = body.as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["state"], "triggered");
        assert_eq!(events[0]["rule_name"], "hot");
        assert_eq!(events[1]["state"], "resolved");
    }

    #[tokio::test]
    async fn test_health_reports_disabled_storage() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state);

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "disabled");
        assert_eq!(body["window_entries"], 0);
    }

    #[tokio::test]
    async fn test_health_reports_connected_storage() {
        let store = SqliteMetricsStore::new_in_memory().await.unwrap();
        let state = test_state(&Config::default(), Some(Arc::new(store))).await;
        let app = test_app(state);

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "connected");
    }

    #[tokio::test]
    async fn test_health_degrades_when_store_unreachable() {
        let store = SqliteMetricsStore::new_in_memory().await.unwrap();
        let pool = store.pool().clone();
        let state = test_state(&Config::default(), Some(Arc::new(store))).await;
        let app = test_app(state);

        pool.close().await;

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["storage"], "disconnected");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = test_state(&Config::default(), None).await;
        let app = test_app(state);

        let response = app.oneshot(get_request("/nope")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
