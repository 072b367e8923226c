//! # Webhook-to-job mapping
//!
//! An inbound provider notification is traced back to the stored tables it concerns, then to
//! every sync reading from or writing to those tables. Each such sync gets one pending
//! data-sync job carrying the original payload.

mod keys;

pub use keys::{TableKey, drive_channel_token, extract_table_key, merge_drive_channel_token};

/// Header carrying the token a Drive watch channel was opened with
pub const DRIVE_CHANNEL_TOKEN_HEADER: &str = "x-goog-channel-token";
/// `sync` on the handshake Drive sends when a channel opens, then `update`, `change` …
pub const DRIVE_RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";

use metrics::counter;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{JobTrigger, sync};
use crate::providers::Provider;
use crate::repositories::{
    ConnectionRepository, JobStore, NewDataSyncJob, SchemaRepository, SyncRepository,
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("provider is required in the path or the request body")]
    MissingProvider,
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result of one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub provider: Provider,
    pub jobs_created: usize,
    pub sync_ids: Vec<Uuid>,
}

/// The path segment wins over a `provider` field in the body.
pub fn resolve_provider(
    path_provider: Option<&str>,
    payload: &JsonValue,
) -> Result<Provider, WebhookError> {
    let raw = path_provider
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .or_else(|| {
            payload
                .get("provider")
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
        })
        .ok_or(WebhookError::MissingProvider)?;

    raw.parse()
        .map_err(|_| WebhookError::UnknownProvider(raw.to_string()))
}

#[derive(Debug, Clone)]
pub struct WebhookService {
    connections: ConnectionRepository,
    schema: SchemaRepository,
    syncs: SyncRepository,
}

impl WebhookService {
    pub fn new(
        connections: ConnectionRepository,
        schema: SchemaRepository,
        syncs: SyncRepository,
    ) -> Self {
        Self {
            connections,
            schema,
            syncs,
        }
    }

    /// Syncs affected by `payload`: provider connections → matching tables → syncs.
    pub async fn webhook_parse(
        &self,
        provider: Provider,
        payload: &JsonValue,
    ) -> Result<Vec<sync::Model>, WebhookError> {
        let Some(table_key) = extract_table_key(provider, payload) else {
            warn!(%provider, "Webhook payload does not identify a table");
            return Ok(Vec::new());
        };

        let connection_ids = self.connections.ids_for_provider(provider).await?;
        let tables = self
            .schema
            .find_tables_by_key(
                &connection_ids,
                &table_key.key,
                table_key.match_name,
                table_key.database.as_deref(),
            )
            .await?;
        let table_ids: Vec<Uuid> = tables.iter().map(|table| table.id).collect();

        let syncs = self.syncs.find_by_table_ids(&table_ids).await?;
        info!(
            %provider,
            key = %table_key.key,
            tables = table_ids.len(),
            syncs = syncs.len(),
            "Webhook matched"
        );
        Ok(syncs)
    }

    /// Enqueue one webhook-triggered job per affected sync.
    #[instrument(skip(self, jobs, payload), fields(provider = %provider))]
    pub async fn handle_webhook<S>(
        &self,
        jobs: &S,
        provider: Provider,
        payload: JsonValue,
    ) -> Result<WebhookOutcome, WebhookError>
    where
        S: JobStore<NewJob = NewDataSyncJob>,
    {
        let syncs = self.webhook_parse(provider, &payload).await?;

        let mut sync_ids = Vec::with_capacity(syncs.len());
        for sync in syncs {
            jobs.create_job(NewDataSyncJob {
                sync_id: sync.id,
                trigger: JobTrigger::Webhook,
                payload: Some(payload.clone()),
            })
            .await?;
            sync_ids.push(sync.id);
        }

        counter!("webhook_jobs_created_total", "provider" => provider.slug())
            .increment(sync_ids.len() as u64);
        Ok(WebhookOutcome {
            provider,
            jobs_created: sync_ids.len(),
            sync_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_provider_wins_over_body() {
        let body = json!({ "provider": "notion" });
        assert_eq!(resolve_provider(Some("airtable"), &body).unwrap(), Provider::Airtable);
        assert_eq!(resolve_provider(None, &body).unwrap(), Provider::Notion);
    }

    #[test]
    fn missing_provider_is_reported() {
        assert!(matches!(
            resolve_provider(None, &json!({ "table": "orders" })),
            Err(WebhookError::MissingProvider)
        ));
        assert!(matches!(
            resolve_provider(Some(" "), &json!({ "provider": "" })),
            Err(WebhookError::MissingProvider)
        ));
    }

    #[test]
    fn unknown_provider_is_reported() {
        assert!(matches!(
            resolve_provider(Some("dropbox"), &json!({})),
            Err(WebhookError::UnknownProvider(p)) if p == "dropbox"
        ));
    }
}
