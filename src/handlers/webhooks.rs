//! # Webhook Handlers
//!
//! Inbound provider notifications. The provider comes from the path segment or, failing
//! that, from a `provider` field in the JSON body; the rest of the body is opaque and stored
//! on every job it produces.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::providers::Provider;
use crate::server::AppState;
use crate::webhooks::{
    DRIVE_CHANNEL_TOKEN_HEADER, DRIVE_RESOURCE_STATE_HEADER, merge_drive_channel_token,
    resolve_provider,
};

/// Path parameter for provider slug
#[derive(Debug, Deserialize, IntoParams)]
pub struct ProviderPathParam {
    /// Provider slug (e.g., "airtable", "google_sheets")
    #[param(min_length = 1, example = "airtable")]
    pub provider: String,
}

/// Jobs enqueued for one delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub provider: Provider,
    pub jobs_created: usize,
    pub sync_ids: Vec<Uuid>,
}

/// Empty bodies and non-JSON bodies are treated as an empty payload
fn parse_webhook_body(bytes: &[u8]) -> JsonValue {
    if bytes.is_empty() {
        return JsonValue::Object(Default::default());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|e| {
        debug!(error = %e, "Webhook body is not JSON");
        JsonValue::Object(Default::default())
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn ingest(
    state: &AppState,
    path_provider: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookResponse>, ApiError> {
    let mut payload = parse_webhook_body(body);
    let provider = resolve_provider(path_provider, &payload)?;

    // Drive push notifications carry no body; the channel token names the sheet
    if provider == Provider::GoogleSheets {
        if header(headers, DRIVE_RESOURCE_STATE_HEADER) == Some("sync") {
            debug!("Drive channel handshake acknowledged");
            return Ok(Json(WebhookResponse {
                provider,
                jobs_created: 0,
                sync_ids: Vec::new(),
            }));
        }
        if let Some(token) = header(headers, DRIVE_CHANNEL_TOKEN_HEADER) {
            merge_drive_channel_token(&mut payload, token);
        }
    }

    let outcome = state
        .webhooks()
        .handle_webhook(&state.data_jobs(), provider, payload)
        .await?;

    Ok(Json(WebhookResponse {
        provider: outcome.provider,
        jobs_created: outcome.jobs_created,
        sync_ids: outcome.sync_ids,
    }))
}

/// Receive a notification naming its provider in the body
#[utoipa::path(
    post,
    path = "/webhooks",
    request_body(content = Option<JsonValue>, description = "Webhook payload with a `provider` field", content_type = "application/json"),
    responses(
        (status = 200, description = "Jobs enqueued for every affected sync", body = WebhookResponse),
        (status = 400, description = "Provider missing", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    ingest(&state, None, &headers, &body).await
}

/// Receive a notification for the provider in the path
#[utoipa::path(
    post,
    path = "/webhooks/{provider}",
    params(ProviderPathParam),
    request_body(content = Option<JsonValue>, description = "Webhook payload (opaque to the API)", content_type = "application/json"),
    responses(
        (status = 200, description = "Jobs enqueued for every affected sync", body = WebhookResponse, example = json!({
            "provider": "airtable",
            "jobs_created": 1,
            "sync_ids": ["550e8400-e29b-41d4-a716-446655440000"]
        })),
        (status = 500, description = "Unhandled provider or internal error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_provider_webhook(
    State(state): State<AppState>,
    Path(params): Path<ProviderPathParam>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    ingest(&state, Some(&params.provider), &headers, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_body_becomes_empty_object() {
        assert_eq!(parse_webhook_body(b""), serde_json::json!({}));
        assert_eq!(parse_webhook_body(b"not json"), serde_json::json!({}));
        assert_eq!(
            parse_webhook_body(br#"{"provider":"notion"}"#),
            serde_json::json!({ "provider": "notion" })
        );
    }
}
