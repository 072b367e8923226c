//! Supabase metadata strategy
//!
//! Reads the PostgREST OpenAPI document, which lists every exposed table under
//! `definitions`. Each configured schema is one source.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};

use super::config_factory::SupabaseConfig;
use super::http::send_json;
use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

/// PostgREST marks primary key columns with this tag in the column description
const PRIMARY_KEY_MARKER: &str = "<pk/>";

#[derive(Debug, Deserialize)]
struct OpenApiDocument {
    #[serde(default)]
    definitions: Map<String, JsonValue>,
}

pub struct SupabaseStrategy {
    http: reqwest::Client,
}

impl SupabaseStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn openapi(
        &self,
        config: &SupabaseConfig,
        schema: &str,
    ) -> Result<OpenApiDocument, StrategyError> {
        let request = self
            .http
            .get(format!("{}/rest/v1/", config.url))
            .header("apikey", &config.api_key)
            .bearer_auth(&config.api_key)
            .header("Accept-Profile", schema)
            .header("Accept", "application/openapi+json");

        send_json(Provider::Supabase, request).await
    }
}

fn definition_to_table(name: &str, definition: &JsonValue, schema: &str) -> DiscoveredTable {
    let required: Vec<&str> = definition
        .get("required")
        .and_then(JsonValue::as_array)
        .map(|items| items.iter().filter_map(JsonValue::as_str).collect())
        .unwrap_or_default();

    let columns = definition
        .get("properties")
        .and_then(JsonValue::as_object)
        .map(|properties| {
            properties
                .iter()
                .enumerate()
                .map(|(position, (column_name, property))| {
                    let data_type = property
                        .get("format")
                        .or_else(|| property.get("type"))
                        .and_then(JsonValue::as_str)
                        .unwrap_or("unknown");
                    let is_primary_key = property
                        .get("description")
                        .and_then(JsonValue::as_str)
                        .is_some_and(|description| description.contains(PRIMARY_KEY_MARKER));

                    DiscoveredColumn {
                        name: column_name.clone(),
                        data_type: data_type.to_string(),
                        is_nullable: !is_primary_key && !required.contains(&column_name.as_str()),
                        is_primary_key,
                        ordinal_position: position as i32 + 1,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    DiscoveredTable::new(format!("{schema}.{name}"), name)
        .with_metadata(json!({ "schema": schema }))
        .with_columns(columns)
}

#[async_trait]
impl MetadataStrategy for SupabaseStrategy {
    fn provider(&self) -> Provider {
        Provider::Supabase
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let config = config.supabase()?;
        Ok(config
            .schemas
            .iter()
            .map(|schema| {
                DiscoveredDatabase::new(schema, schema).with_metadata(json!({ "url": config.url }))
            })
            .collect())
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let config = config.supabase()?;
        let document = self.openapi(config, &source.external_id).await?;

        Ok(document
            .definitions
            .iter()
            .map(|(name, definition)| definition_to_table(name, definition, &source.external_id))
            .collect())
    }

    /// Sources are derived from configuration, so hit the API to prove the key works.
    async fn validate(&self, config: &ProviderConfig) -> Result<(), StrategyError> {
        let supabase = config.supabase()?;
        let schema = supabase
            .schemas
            .first()
            .map(String::as_str)
            .unwrap_or("public");
        self.openapi(supabase, schema).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEndpoints;
    use crate::providers::ConfigFactory;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> ProviderConfig {
        ConfigFactory::new(ApiEndpoints::default())
            .build(
                Provider::Supabase,
                &json!({ "api_key": "service-role" }),
                &json!({ "url": url, "schemas": ["public", "crm"] }),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn schemas_are_sources() {
        let strategy = SupabaseStrategy::new(reqwest::Client::new());
        let sources = strategy
            .get_sources(&config("https://proj.supabase.co"))
            .await
            .unwrap();
        let ids: Vec<_> = sources.iter().map(|s| s.external_id.as_str()).collect();
        assert_eq!(ids, vec!["public", "crm"]);
    }

    #[tokio::test]
    async fn openapi_definitions_become_tables() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/"))
            .and(header("apikey", "service-role"))
            .and(header("Accept-Profile", "crm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "definitions": {
                    "contacts": {
                        "required": ["id", "email"],
                        "properties": {
                            "id": { "format": "bigint", "type": "integer", "description": "Note:\nThis is a Primary Key.<pk/>" },
                            "email": { "format": "text", "type": "string" },
                            "nickname": { "format": "text", "type": "string" }
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let strategy = SupabaseStrategy::new(reqwest::Client::new());
        let tables = strategy
            .get_tables(&config(&server.uri()), &DiscoveredDatabase::new("crm", "crm"))
            .await
            .unwrap();

        assert_eq!(tables[0].external_id, "crm.contacts");
        let column = |name: &str| tables[0].columns.iter().find(|c| c.name == name).unwrap();
        assert!(column("id").is_primary_key);
        assert_eq!(column("id").data_type, "bigint");
        assert!(!column("email").is_nullable);
        assert!(column("nickname").is_nullable);
    }
}
