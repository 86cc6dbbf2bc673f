//! Health check endpoints for load balancers and uptime monitors.

use axum::{Json, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Always "healthy" while the process can serve requests.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Service health and version.
///
/// Sessions are held in memory and there are no other backing services, so
/// answering at all means the service is healthy.
#[tracing::instrument(name = "health.check")]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Bare liveness probe: 200 with an empty body.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}
