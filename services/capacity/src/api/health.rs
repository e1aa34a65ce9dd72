//! Health check endpoints.
//!
//! These endpoints are used by load balancers and orchestration systems
//! to determine if the service is healthy and ready to receive traffic.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: "ok" or "degraded".
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Storage status, only reported by the readiness probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<ComponentStatus>,
}

/// Individual component status.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ComponentStatus {
    /// Status: "ok" or "unavailable".
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(livez))
}

fn response(status: &str, storage: Option<ComponentStatus>) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        service: "capacity-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        storage,
    }
}

/// Basic health check - is the service running? Does not check dependencies.
async fn healthz() -> impl IntoResponse {
    Json(response("ok", None))
}

/// Readiness check: 503 unless storage answers.
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(response(
                "ok",
                Some(ComponentStatus {
                    status: "ok".to_string(),
                    message: None,
                }),
            )),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(response(
                "degraded",
                Some(ComponentStatus {
                    status: "unavailable".to_string(),
                    message: Some(e.to_string()),
                }),
            )),
        ),
    }
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
