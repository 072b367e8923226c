//! Metadata strategy contract
//!
//! Defines the interface every provider strategy implements and the shapes it reports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use utoipa::ToSchema;

use super::Provider;
use super::config_factory::{ProviderConfig, ProviderConfigError};

/// Failures surfaced by provider strategies
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Could not reach the provider or open a client
    #[error("{provider} connection failed: {message}")]
    Connection { provider: Provider, message: String },
    /// Credentials were rejected
    #[error("{provider} rejected the supplied credentials")]
    Unauthorized { provider: Provider },
    /// Provider answered with a non-success status
    #[error("{provider} returned HTTP {status}")]
    Upstream {
        provider: Provider,
        status: u16,
        body: Option<String>,
    },
    /// Provider answered with something we could not interpret
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: Provider, message: String },
    /// Operation not available for this provider
    #[error("{operation} is not supported for {provider}")]
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },
    /// Call exceeded the discovery timeout
    #[error("{provider} did not respond within {seconds}s")]
    Timeout { provider: Provider, seconds: u64 },
    /// A strategy was handed another provider's configuration
    #[error("expected {expected} configuration, got {actual}")]
    ConfigMismatch { expected: Provider, actual: Provider },
    #[error(transparent)]
    Config(#[from] ProviderConfigError),
}

impl StrategyError {
    pub fn connection(provider: Provider, error: impl std::fmt::Display) -> Self {
        Self::Connection {
            provider,
            message: error.to_string(),
        }
    }

    pub fn malformed(provider: Provider, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            message: message.into(),
        }
    }
}

/// A top-level container discovered on the provider (base, spreadsheet, schema, bucket…)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiscoveredDatabase {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl DiscoveredDatabase {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A table-like entity inside a [`DiscoveredDatabase`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiscoveredTable {
    pub external_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(default)]
    pub columns: Vec<DiscoveredColumn>,
}

impl DiscoveredTable {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            metadata: None,
            columns: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_columns(mut self, columns: Vec<DiscoveredColumn>) -> Self {
        self.columns = columns;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscoveredColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: i32,
}

impl DiscoveredColumn {
    /// Nullable, non-key column; the common case for document and spreadsheet providers.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: i32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            ordinal_position,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }
}

/// Standard interface for provider metadata discovery
///
/// Strategies open their native client per call and drop it before returning.
/// Persisting what they report is the caller's job.
#[async_trait]
pub trait MetadataStrategy: Send + Sync {
    fn provider(&self) -> Provider;

    /// Enumerate the top-level containers reachable with `config`
    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError>;

    /// Enumerate the tables of one source, columns included
    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError>;

    /// Cheap connectivity check
    async fn validate(&self, config: &ProviderConfig) -> Result<(), StrategyError> {
        self.get_sources(config).await.map(|_| ())
    }
}
