//! Airtable metadata strategy
//!
//! Bases are sources; tables come from the base schema endpoint with fields as columns.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::config_factory::AirtableConfig;
use super::http::send_json;
use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

#[derive(Debug, Deserialize)]
struct BasesPage {
    #[serde(default)]
    bases: Vec<Base>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Base {
    id: String,
    name: String,
    permission_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TablesResponse {
    #[serde(default)]
    tables: Vec<Table>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Table {
    id: String,
    name: String,
    primary_field_id: Option<String>,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    id: String,
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

pub struct AirtableStrategy {
    http: reqwest::Client,
}

impl AirtableStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn url(config: &AirtableConfig, path: &str) -> String {
        format!("{}{}", config.api_base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl MetadataStrategy for AirtableStrategy {
    fn provider(&self) -> Provider {
        Provider::Airtable
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let config = config.airtable()?;
        let mut sources = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(Self::url(config, "/v0/meta/bases"))
                .bearer_auth(&config.access_token);
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset)]);
            }

            let page: BasesPage = send_json(Provider::Airtable, request).await?;
            sources.extend(page.bases.into_iter().map(|base| {
                DiscoveredDatabase::new(base.id, base.name)
                    .with_metadata(json!({ "permission_level": base.permission_level }))
            }));

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(sources)
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let config = config.airtable()?;
        let request = self
            .http
            .get(Self::url(
                config,
                &format!("/v0/meta/bases/{}/tables", source.external_id),
            ))
            .bearer_auth(&config.access_token);

        let response: TablesResponse = send_json(Provider::Airtable, request).await?;

        Ok(response
            .tables
            .into_iter()
            .map(|table| {
                let columns = table
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(position, field)| {
                        let column =
                            DiscoveredColumn::new(&field.name, &field.field_type, position as i32 + 1);
                        if table.primary_field_id.as_deref() == Some(field.id.as_str()) {
                            column.primary_key()
                        } else {
                            column
                        }
                    })
                    .collect();

                DiscoveredTable::new(table.id, table.name)
                    .with_metadata(json!({ "base_id": source.external_id }))
                    .with_columns(columns)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEndpoints;
    use crate::providers::ConfigFactory;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> ProviderConfig {
        ConfigFactory::new(ApiEndpoints::default())
            .build(
                Provider::Airtable,
                &json!({ "access_token": "pat123" }),
                &json!({ "api_base": base }),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn follows_offset_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/meta/bases"))
            .and(query_param("offset", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bases": [{ "id": "app2", "name": "Second", "permissionLevel": "read" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0/meta/bases"))
            .and(header("authorization", "Bearer pat123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bases": [{ "id": "app1", "name": "First", "permissionLevel": "create" }],
                "offset": "page2"
            })))
            .mount(&server)
            .await;

        let strategy = AirtableStrategy::new(reqwest::Client::new());
        let sources = strategy.get_sources(&config(&server.uri())).await.unwrap();

        let ids: Vec<_> = sources.iter().map(|s| s.external_id.as_str()).collect();
        assert_eq!(ids, vec!["app1", "app2"]);
    }

    #[tokio::test]
    async fn maps_fields_to_columns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/meta/bases/app1/tables"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tables": [{
                    "id": "tblA",
                    "name": "Contacts",
                    "primaryFieldId": "fld1",
                    "fields": [
                        { "id": "fld1", "name": "Name", "type": "singleLineText" },
                        { "id": "fld2", "name": "Email", "type": "email" }
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let strategy = AirtableStrategy::new(reqwest::Client::new());
        let tables = strategy
            .get_tables(&config(&server.uri()), &DiscoveredDatabase::new("app1", "First"))
            .await
            .unwrap();

        assert_eq!(tables.len(), 1);
        let columns = &tables[0].columns;
        assert_eq!(columns[0].name, "Name");
        assert!(columns[0].is_primary_key);
        assert_eq!(columns[1].data_type, "email");
        assert_eq!(columns[1].ordinal_position, 2);
    }

    #[tokio::test]
    async fn unauthorized_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let strategy = AirtableStrategy::new(reqwest::Client::new());
        let err = strategy.get_sources(&config(&server.uri())).await.unwrap_err();
        assert!(matches!(
            err,
            StrategyError::Unauthorized {
                provider: Provider::Airtable
            }
        ));
    }
}
