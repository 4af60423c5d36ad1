use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: String,
    pub db_connected: bool,
}

/// Always answers; reports whether the store is currently connected.
pub async fn test_connection(State(state): State<AppState>) -> Json<TestResponse> {
    tracing::info!("Received test request");
    Json(TestResponse {
        status: "ok",
        message: "Backend service is running",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        db_connected: state.connector.is_ready(),
    })
}

/// Liveness probe: the process is up, regardless of the store.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "map-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: 200 only while the store connection is ready.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.connector.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
