//! Metadata discovery
//!
//! Runs a provider strategy and persists what it reports. Every remote call is bounded by the
//! discovery timeout; running out of time counts as a strategy failure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::connection_database;
use crate::providers::{
    DiscoveredDatabase, Provider, ProviderConfig, StrategyError, StrategyRegistry,
};
use crate::repositories::{DatabaseSchema, SchemaRepository, TableSchema};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("failed to persist discovered schema: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct MetadataDiscovery {
    schema: SchemaRepository,
    registry: StrategyRegistry,
    timeout: Duration,
}

impl MetadataDiscovery {
    pub fn new(schema: SchemaRepository, registry: StrategyRegistry, timeout: Duration) -> Self {
        Self {
            schema,
            registry,
            timeout,
        }
    }

    async fn bounded<T, F>(&self, provider: Provider, call: F) -> Result<T, StrategyError>
    where
        F: Future<Output = Result<T, StrategyError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StrategyError::Timeout {
                provider,
                seconds: self.timeout.as_secs(),
            })?
    }

    /// Discover and persist the sources of a connection
    pub async fn get_sources(
        &self,
        connection_id: Uuid,
        config: &ProviderConfig,
    ) -> Result<Vec<connection_database::Model>, DiscoveryError> {
        let provider = config.provider();
        let strategy = self.registry.get(provider)?;
        let sources = self.bounded(provider, strategy.get_sources(config)).await?;

        let mut persisted = Vec::with_capacity(sources.len());
        for source in &sources {
            persisted.push(self.schema.upsert_database(connection_id, source).await?);
        }

        tracing::debug!(
            connection_id = %connection_id,
            provider = %provider,
            sources = persisted.len(),
            "Sources discovered"
        );
        Ok(persisted)
    }

    /// Discover and persist the tables and columns of one persisted source
    pub async fn get_tables(
        &self,
        connection_id: Uuid,
        database: &connection_database::Model,
        config: &ProviderConfig,
    ) -> Result<Vec<TableSchema>, DiscoveryError> {
        let provider = config.provider();
        let strategy = self.registry.get(provider)?;
        let source = DiscoveredDatabase {
            external_id: database.external_id.clone(),
            name: database.name.clone(),
            metadata: database.metadata.clone(),
        };
        let tables = self
            .bounded(provider, strategy.get_tables(config, &source))
            .await?;

        let mut persisted = Vec::with_capacity(tables.len());
        for table in &tables {
            persisted.push(
                self.schema
                    .upsert_table(connection_id, database.id, table)
                    .await?,
            );
        }

        let keep: Vec<Uuid> = persisted.iter().map(|t| t.table.id).collect();
        let pruned = self.schema.prune_tables(database.id, &keep).await?;

        tracing::debug!(
            connection_id = %connection_id,
            database = %database.external_id,
            tables = persisted.len(),
            pruned,
            "Tables discovered"
        );
        Ok(persisted)
    }

    /// Discover sources, then tables of every source, dropping rows the provider no longer
    /// reports
    pub async fn discover_all(
        &self,
        connection_id: Uuid,
        config: &ProviderConfig,
    ) -> Result<Vec<DatabaseSchema>, DiscoveryError> {
        let databases = self.get_sources(connection_id, config).await?;

        let mut schema = Vec::with_capacity(databases.len());
        for database in databases {
            let tables = self.get_tables(connection_id, &database, config).await?;
            schema.push(DatabaseSchema { database, tables });
        }

        let keep: Vec<Uuid> = schema.iter().map(|s| s.database.id).collect();
        self.schema.prune_databases(connection_id, &keep).await?;

        tracing::info!(
            connection_id = %connection_id,
            provider = %config.provider(),
            databases = schema.len(),
            tables = schema.iter().map(|s| s.tables.len()).sum::<usize>(),
            "Metadata discovery finished"
        );
        Ok(schema)
    }

    /// Connectivity check without persisting anything
    pub async fn validate(&self, config: &ProviderConfig) -> Result<(), StrategyError> {
        let provider = config.provider();
        let strategy = self.registry.get(provider)?;
        self.bounded(provider, strategy.validate(config)).await
    }

    pub async fn rollback(&self, connection_id: Uuid) -> anyhow::Result<u64> {
        self.schema.rollback_database_sync(connection_id).await
    }
}
