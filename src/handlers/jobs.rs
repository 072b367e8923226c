//! # Job Handlers
//!
//! HTTP triggers for the scheduled handlers. Each call processes at most one job.

use axum::{extract::State, response::Json};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::jobs::JobOutcome;
use crate::server::AppState;

/// Process the oldest pending metadata-sync job
#[utoipa::path(
    post,
    path = "/jobs/metadata/process",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Processing attempt finished", body = JobOutcome, example = json!({
            "outcome": "completed",
            "job_id": "550e8400-e29b-41d4-a716-446655440000"
        })),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn process_metadata_jobs(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<JobOutcome>, ApiError> {
    let outcome = state.metadata_handler().process_next().await?;
    Ok(Json(outcome))
}

/// Process the oldest pending data-sync job
#[utoipa::path(
    post,
    path = "/jobs/data/process",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Processing attempt finished", body = JobOutcome),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn process_data_jobs(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<JobOutcome>, ApiError> {
    let outcome = state.data_handler().process_next().await?;
    Ok(Json(outcome))
}
