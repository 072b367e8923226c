//! # Token Refresh
//!
//! Single conditional re-fetch of an OAuth access token. When a connection's access token
//! expires within the lead time and a refresh token is stored, the refresh grant is posted
//! once and the new credentials are persisted. There is no retry loop.

use chrono::{Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ApiEndpoints, OAuthClientsConfig};
use crate::models::connection;
use crate::providers::Provider;
use crate::repositories::ConnectionRepository;
use crate::repositories::connection::STATUS_ERROR;

#[derive(Debug, Error)]
pub enum TokenRefreshError {
    #[error("no OAuth client configured for {provider}")]
    MissingClientCredentials { provider: Provider },
    #[error("token endpoint unreachable: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{provider} token endpoint rejected the refresh (HTTP {status})")]
    Rejected {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Whether the token endpoint said the refresh token itself is no longer usable
fn is_permanent_failure(body: &str) -> bool {
    let body = body.to_lowercase();
    ["invalid_grant", "invalid_client", "unauthorized_client", "access_denied"]
        .iter()
        .any(|code| body.contains(code))
}

#[derive(Clone)]
pub struct TokenRefresher {
    http: reqwest::Client,
    connections: ConnectionRepository,
    oauth: OAuthClientsConfig,
    endpoints: ApiEndpoints,
    lead_time: Duration,
}

impl TokenRefresher {
    pub fn new(
        http: reqwest::Client,
        connections: ConnectionRepository,
        oauth: OAuthClientsConfig,
        endpoints: ApiEndpoints,
        lead_time_seconds: u64,
    ) -> Self {
        Self {
            http,
            connections,
            oauth,
            endpoints,
            lead_time: Duration::seconds(i64::try_from(lead_time_seconds).unwrap_or(i64::MAX / 1000)),
        }
    }

    fn client_for(&self, provider: Provider) -> Option<(&str, Option<&str>, &str)> {
        match provider {
            Provider::GoogleSheets => Some((
                self.oauth.google_client_id.as_deref()?,
                self.oauth.google_client_secret.as_deref(),
                self.endpoints.google_token_url.as_str(),
            )),
            Provider::Airtable => Some((
                self.oauth.airtable_client_id.as_deref()?,
                self.oauth.airtable_client_secret.as_deref(),
                self.endpoints.airtable_token_url.as_str(),
            )),
            _ => None,
        }
    }

    /// Decrypted credentials for `connection`, refreshed first when the access token is about
    /// to expire
    pub async fn ensure_fresh_credentials(
        &self,
        connection: &connection::Model,
    ) -> Result<JsonValue, TokenRefreshError> {
        let credentials = self.connections.credentials(connection)?;
        let provider = ConnectionRepository::provider(connection)?;

        let due = connection
            .expires_at
            .is_some_and(|expires_at| expires_at.with_timezone(&Utc) - Utc::now() <= self.lead_time);
        let refresh_token = credentials
            .get("refresh_token")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let Some(refresh_token) = refresh_token.filter(|_| due) else {
            return Ok(credentials);
        };

        let (client_id, client_secret, token_url) = self
            .client_for(provider)
            .ok_or(TokenRefreshError::MissingClientCredentials { provider })?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id),
        ];
        let mut request = self.http.post(token_url);
        match (provider, client_secret) {
            // Airtable confidential clients authenticate with HTTP Basic
            (Provider::Airtable, Some(secret)) => {
                request = request.basic_auth(client_id, Some(secret));
            }
            (_, Some(secret)) => form.push(("client_secret", secret)),
            (_, None) => {}
        }

        let resp = request.form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            counter!("token_refresh_failure_total", "provider" => provider.slug()).increment(1);

            if is_permanent_failure(&body) {
                warn!(
                    connection_id = %connection.id,
                    provider = %provider,
                    "Refresh token rejected, marking connection as error"
                );
                self.connections.set_status(connection.id, STATUS_ERROR).await?;
            }
            return Err(TokenRefreshError::Rejected {
                provider,
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        let mut refreshed = credentials;
        refreshed["access_token"] = json!(token.access_token);
        if let Some(rotated) = token.refresh_token {
            refreshed["refresh_token"] = json!(rotated);
        }
        let expires_at = token
            .expires_in
            .map(|seconds| (Utc::now() + Duration::seconds(seconds)).fixed_offset());

        self.connections
            .update_credentials(connection, &refreshed, expires_at)
            .await?;

        counter!("token_refresh_success_total", "provider" => provider.slug()).increment(1);
        info!(
            connection_id = %connection.id,
            provider = %provider,
            "Refreshed OAuth access token"
        );
        Ok(refreshed)
    }
}
