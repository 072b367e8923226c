//! # Listener Handlers

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::listeners::ListenerRegistration;
use crate::server::AppState;
use crate::webhooks::resolve_provider;

/// Request to register change notifications for one table
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetupListenerRequest {
    /// Provider slug
    pub provider: String,
    /// Credentials plus provider parameters (`base_id`, `spreadsheet_id`, `schema` …)
    #[serde(default)]
    pub connection_config: JsonValue,
    pub table_name: String,
}

/// Register provider-side change notifications for a table
#[utoipa::path(
    post,
    path = "/listeners",
    security(("bearer_auth" = [])),
    request_body = SetupListenerRequest,
    responses(
        (status = 201, description = "Listener registered", body = ListenerRegistration),
        (status = 400, description = "Unsupported provider or invalid request", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Table not found at the provider", body = ApiError),
        (status = 502, description = "Provider rejected the registration", body = ApiError)
    ),
    tag = "listeners"
)]
pub async fn setup_listener(
    State(state): State<AppState>,
    _principal: Principal,
    Json(request): Json<SetupListenerRequest>,
) -> Result<(StatusCode, Json<ListenerRegistration>), ApiError> {
    let provider = resolve_provider(Some(&request.provider), &JsonValue::Null)?;
    let registration = state
        .listeners()
        .setup_listener(provider, &request.connection_config, &request.table_name)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}
