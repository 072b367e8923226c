//! Connection resolution
//!
//! Loads a stored connection and turns it into the typed [`ProviderConfig`] a strategy needs:
//! decrypt the credentials, refresh an expiring OAuth token, then run the config factory.

use thiserror::Error;
use uuid::Uuid;

use crate::models::connection;
use crate::providers::{ConfigFactory, Provider, ProviderConfig, ProviderConfigError};
use crate::repositories::ConnectionRepository;
use crate::token_refresh::{TokenRefreshError, TokenRefresher};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("connection {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Refresh(#[from] TokenRefreshError),
    #[error(transparent)]
    Config(#[from] ProviderConfigError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A connection ready for a strategy call
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub connection: connection::Model,
    pub provider: Provider,
    pub config: ProviderConfig,
}

#[derive(Clone)]
pub struct ConnectionResolver {
    connections: ConnectionRepository,
    refresher: TokenRefresher,
    factory: ConfigFactory,
}

impl ConnectionResolver {
    pub fn new(
        connections: ConnectionRepository,
        refresher: TokenRefresher,
        factory: ConfigFactory,
    ) -> Self {
        Self {
            connections,
            refresher,
            factory,
        }
    }

    pub async fn resolve(&self, connection_id: Uuid) -> Result<ResolvedConnection, ResolveError> {
        let connection = self
            .connections
            .get_by_id(connection_id)
            .await?
            .ok_or(ResolveError::NotFound(connection_id))?;
        let provider = ConnectionRepository::provider(&connection)?;

        let credentials = self.refresher.ensure_fresh_credentials(&connection).await?;
        let config = self.factory.build(
            provider,
            &credentials,
            connection.config.as_ref().unwrap_or(&serde_json::Value::Null),
        )?;

        Ok(ResolvedConnection {
            connection,
            provider,
            config,
        })
    }
}
