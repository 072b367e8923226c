//! Strategy registry
//!
//! Maps each [`Provider`] to the strategy that discovers its schema.

use std::collections::HashMap;
use std::sync::Arc;

use super::airtable::AirtableStrategy;
use super::google_sheets::GoogleSheetsStrategy;
use super::mongodb::MongoDbStrategy;
use super::mysql::MySqlStrategy;
use super::notion::NotionStrategy;
use super::postgres::PostgresStrategy;
use super::s3::S3Strategy;
use super::sql_server::SqlServerStrategy;
use super::supabase::SupabaseStrategy;
use super::{MetadataStrategy, Provider, StrategyError};

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<Provider, Arc<dyn MetadataStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a strategy for every supported provider, sharing one HTTP client
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            let strategy: Arc<dyn MetadataStrategy> = match provider {
                Provider::Airtable => Arc::new(AirtableStrategy::new(http.clone())),
                Provider::GoogleSheets => Arc::new(GoogleSheetsStrategy::new(http.clone())),
                Provider::Notion => Arc::new(NotionStrategy::new(http.clone())),
                Provider::Supabase => Arc::new(SupabaseStrategy::new(http.clone())),
                Provider::Postgres => Arc::new(PostgresStrategy::new()),
                Provider::MySql => Arc::new(MySqlStrategy::new()),
                Provider::MongoDb => Arc::new(MongoDbStrategy::new()),
                Provider::SqlServer => Arc::new(SqlServerStrategy::new()),
                Provider::S3 => Arc::new(S3Strategy::new(http.clone())),
            };
            registry.register(strategy);
        }
        registry
    }

    /// Register (or replace) the strategy for its provider
    pub fn register(&mut self, strategy: Arc<dyn MetadataStrategy>) {
        self.strategies.insert(strategy.provider(), strategy);
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn MetadataStrategy>, StrategyError> {
        self.strategies
            .get(&provider)
            .cloned()
            .ok_or(StrategyError::Unsupported {
                provider,
                operation: "metadata discovery",
            })
    }

    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<Provider> = self.strategies.keys().copied().collect();
        providers.sort();
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_provider() {
        let registry = StrategyRegistry::with_defaults(reqwest::Client::new());
        assert_eq!(registry.providers(), Provider::ALL.to_vec());
        for provider in Provider::ALL {
            assert_eq!(registry.get(provider).unwrap().provider(), provider);
        }
    }

    #[test]
    fn empty_registry_reports_unsupported() {
        let registry = StrategyRegistry::new();
        assert!(matches!(
            registry.get(Provider::Notion),
            Err(StrategyError::Unsupported {
                provider: Provider::Notion,
                ..
            })
        ));
    }
}
