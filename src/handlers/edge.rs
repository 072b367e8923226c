//! # Edge Handlers
//!
//! Synchronous schema discovery and connection checks for the dashboard.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::handlers::types::SchemaResponse;
use crate::server::AppState;
use crate::webhooks::resolve_provider;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiscoverRequest {
    pub connection_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateConnectionRequest {
    /// Provider slug
    pub provider: String,
    /// Credentials plus provider parameters, as they would be stored on a connection
    #[serde(default)]
    pub config: JsonValue,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateConnectionResponse {
    pub valid: bool,
    pub message: String,
}

/// Discover and persist the schema of a connection
#[utoipa::path(
    post,
    path = "/edge/discover",
    security(("bearer_auth" = [])),
    request_body = DiscoverRequest,
    responses(
        (status = 200, description = "Discovered schema", body = SchemaResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 502, description = "Provider call failed", body = ApiError),
        (status = 504, description = "Provider call timed out", body = ApiError)
    ),
    tag = "edge"
)]
pub async fn discover(
    State(state): State<AppState>,
    _principal: Principal,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let resolved = state.resolver().resolve(request.connection_id).await?;
    let schema = state
        .discovery()
        .discover_all(request.connection_id, &resolved.config)
        .await?;

    Ok(Json(SchemaResponse::new(request.connection_id, schema)))
}

/// Check credentials against the provider without storing anything
#[utoipa::path(
    post,
    path = "/edge/validate-connection",
    security(("bearer_auth" = [])),
    request_body = ValidateConnectionRequest,
    responses(
        (status = 200, description = "Validation result", body = ValidateConnectionResponse, example = json!({
            "valid": false,
            "message": "missing required field 'region' for s3"
        })),
        (status = 400, description = "Unknown provider", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "edge"
)]
pub async fn validate_connection(
    State(state): State<AppState>,
    _principal: Principal,
    Json(request): Json<ValidateConnectionRequest>,
) -> Result<Json<ValidateConnectionResponse>, ApiError> {
    let provider = resolve_provider(Some(&request.provider), &JsonValue::Null)?;

    let result = match state
        .config_factory()
        .build(provider, &request.config, &JsonValue::Null)
    {
        Ok(config) => state.discovery().validate(&config).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let response = match result {
        Ok(()) => ValidateConnectionResponse {
            valid: true,
            message: format!("Connected to {}", provider.display_name()),
        },
        Err(message) => ValidateConnectionResponse {
            valid: false,
            message,
        },
    };
    info!(%provider, valid = response.valid, "Connection validated");
    Ok(Json(response))
}
