//! Health endpoints

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is live", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Connectivity check
#[utoipa::path(
    get,
    path = "/api/v1/ping",
    tag = "Health",
    responses((status = 200, description = "Pong"))
)]
pub async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}
