//! MongoDB metadata strategy
//!
//! Collections have no declared schema, so columns are inferred from one sampled document.

use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Bson, Document, doc};
use serde_json::json;

use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

const SYSTEM_DATABASES: [&str; 3] = ["admin", "local", "config"];

pub struct MongoDbStrategy;

impl MongoDbStrategy {
    pub fn new() -> Self {
        Self
    }

    async fn connect(config: &ProviderConfig) -> Result<Client, StrategyError> {
        let mongo = config.mongodb()?;
        Client::with_uri_str(&mongo.connection_string)
            .await
            .map_err(mongo_error)
    }
}

impl Default for MongoDbStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn mongo_error(error: mongodb::error::Error) -> StrategyError {
    match *error.kind {
        mongodb::error::ErrorKind::Authentication { .. } => StrategyError::Unauthorized {
            provider: Provider::MongoDb,
        },
        _ => StrategyError::connection(Provider::MongoDb, error),
    }
}

/// Human-readable BSON type name, matching the `$type` aliases
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        _ => "unknown",
    }
}

fn document_columns(document: &Document) -> Vec<DiscoveredColumn> {
    document
        .iter()
        .enumerate()
        .map(|(position, (field, value))| {
            let column = DiscoveredColumn::new(field, bson_type_name(value), position as i32 + 1);
            if field == "_id" {
                column.primary_key()
            } else {
                column
            }
        })
        .collect()
}

#[async_trait]
impl MetadataStrategy for MongoDbStrategy {
    fn provider(&self) -> Provider {
        Provider::MongoDb
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let client = Self::connect(config).await?;
        let names = client.list_database_names().await.map_err(mongo_error)?;

        Ok(names
            .into_iter()
            .filter(|name| !SYSTEM_DATABASES.contains(&name.as_str()))
            .map(|name| DiscoveredDatabase::new(&name, &name))
            .collect())
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let client = Self::connect(config).await?;
        let database = client.database(&source.external_id);
        let mut names = database
            .list_collection_names()
            .await
            .map_err(mongo_error)?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let sample = database
                .collection::<Document>(&name)
                .find_one(doc! {})
                .await
                .map_err(mongo_error)?;
            let columns = sample.as_ref().map(document_columns).unwrap_or_default();

            tables.push(
                DiscoveredTable::new(&name, &name)
                    .with_metadata(json!({
                        "database": source.external_id,
                        "sampled": sample.is_some(),
                    }))
                    .with_columns(columns),
            );
        }

        Ok(tables)
    }

    async fn validate(&self, config: &ProviderConfig) -> Result<(), StrategyError> {
        let client = Self::connect(config).await?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(mongo_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn sampled_document_fields_become_columns() {
        let document = doc! {
            "_id": ObjectId::new(),
            "email": "a@example.com",
            "visits": 3_i32,
            "tags": ["x"],
        };

        let columns = document_columns(&document);
        let described: Vec<_> = columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str(), c.is_primary_key))
            .collect();
        assert_eq!(
            described,
            vec![
                ("_id", "objectId", true),
                ("email", "string", false),
                ("visits", "int", false),
                ("tags", "array", false),
            ]
        );
    }
}
