//! # Connection Handlers
//!
//! Create connections, read their discovered schema and queue rediscovery.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::{ApiError, not_found, validation_error};
use crate::handlers::types::SchemaResponse;
use crate::providers::Provider;
use crate::repositories::{JobStore, NewConnection, NewMetadataSyncJob};
use crate::server::AppState;
use crate::webhooks::resolve_provider;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateConnectionRequest {
    pub team_id: Uuid,
    /// Provider slug
    pub provider: String,
    pub name: String,
    /// Secrets (API key, OAuth tokens, passwords); stored encrypted
    #[serde(default)]
    pub credentials: JsonValue,
    /// Non-secret parameters (host, base id, bucket …)
    #[serde(default)]
    pub config: Option<JsonValue>,
    /// Expiry of the OAuth access token
    #[serde(default)]
    pub expires_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateConnectionResponse {
    pub id: Uuid,
    pub provider: Provider,
    pub name: String,
    pub status: String,
    /// Metadata-sync job queued for the new connection
    pub metadata_sync_job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnqueuedJobResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// Create a connection and queue its first metadata sync
#[utoipa::path(
    post,
    path = "/connections",
    security(("bearer_auth" = [])),
    request_body = CreateConnectionRequest,
    responses(
        (status = 201, description = "Connection created", body = CreateConnectionResponse),
        (status = 400, description = "Unknown provider or missing provider fields", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    _principal: Principal,
    Json(request): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<CreateConnectionResponse>), ApiError> {
    let provider = resolve_provider(Some(&request.provider), &JsonValue::Null)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(validation_error(
            "Connection name must not be empty",
            serde_json::json!({ "name": "required" }),
        ));
    }

    // Reject incomplete credentials before anything is stored
    let config = request.config.clone().unwrap_or(JsonValue::Null);
    state
        .config_factory()
        .build(provider, &request.credentials, &config)?;

    let connection = state
        .connections()
        .create(NewConnection {
            team_id: request.team_id,
            provider,
            name: name.to_string(),
            credentials: request.credentials,
            config: request.config,
            expires_at: request.expires_at,
        })
        .await?;
    let job = state
        .metadata_jobs()
        .create_job(NewMetadataSyncJob {
            connection_id: connection.id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConnectionResponse {
            id: connection.id,
            provider,
            name: connection.name,
            status: connection.status,
            metadata_sync_job_id: job.id,
        }),
    ))
}

/// Persisted schema of a connection
#[utoipa::path(
    get,
    path = "/connections/{id}/schema",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 200, description = "Databases, tables and columns", body = SchemaResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn get_schema(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<SchemaResponse>, ApiError> {
    if state.connections().get_by_id(id).await?.is_none() {
        return Err(not_found("Connection", id));
    }
    let schema = state.schema().load_schema(id).await?;
    Ok(Json(SchemaResponse::new(id, schema)))
}

/// Queue a metadata sync for a connection
#[utoipa::path(
    post,
    path = "/connections/{id}/metadata-sync",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Connection id")),
    responses(
        (status = 202, description = "Job queued", body = EnqueuedJobResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn enqueue_metadata_sync(
    State(state): State<AppState>,
    _principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnqueuedJobResponse>), ApiError> {
    if state.connections().get_by_id(id).await?.is_none() {
        return Err(not_found("Connection", id));
    }
    let job = state
        .metadata_jobs()
        .create_job(NewMetadataSyncJob { connection_id: id })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}
