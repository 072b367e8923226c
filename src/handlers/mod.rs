//! # API Handlers
//!
//! HTTP endpoint handlers for the Syncflow API.

use axum::response::Json;

use crate::models::HealthStatus;

pub mod connections;
pub mod edge;
pub mod jobs;
pub mod listeners;
pub mod syncs;
pub mod types;
pub mod webhooks;

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthStatus)
    ),
    tag = "health"
)]
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        message: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
