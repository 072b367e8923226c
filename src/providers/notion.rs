//! Notion metadata strategy
//!
//! A Notion integration sees exactly one workspace, reported as a single source. Databases
//! shared with the integration are its tables and their properties are the columns.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};

use super::config_factory::NotionConfig;
use super::http::send_json;
use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

#[derive(Debug, Deserialize)]
struct BotUser {
    id: String,
    name: Option<String>,
    bot: Option<BotInfo>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    workspace_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<NotionDatabase>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionDatabase {
    id: String,
    #[serde(default)]
    title: Vec<RichText>,
    #[serde(default)]
    properties: Map<String, JsonValue>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

pub struct NotionStrategy {
    http: reqwest::Client,
}

impl NotionStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn request(
        &self,
        config: &NotionConfig,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(
                method,
                format!("{}{}", config.api_base.trim_end_matches('/'), path),
            )
            .bearer_auth(&config.api_key)
            .header("Notion-Version", &config.notion_version)
    }
}

fn database_to_table(database: NotionDatabase, workspace_id: &str) -> DiscoveredTable {
    let title: String = database
        .title
        .iter()
        .map(|part| part.plain_text.as_str())
        .collect();
    let name = if title.trim().is_empty() {
        "Untitled".to_string()
    } else {
        title
    };

    let columns = database
        .properties
        .iter()
        .enumerate()
        .map(|(position, (property_name, property))| {
            let property_type = property
                .get("type")
                .and_then(JsonValue::as_str)
                .unwrap_or("unknown");
            let column = DiscoveredColumn::new(property_name, property_type, position as i32 + 1);
            // The title property is the row identity in Notion
            if property_type == "title" {
                column.primary_key()
            } else {
                column
            }
        })
        .collect();

    DiscoveredTable::new(database.id, name)
        .with_metadata(json!({ "workspace_id": workspace_id, "url": database.url }))
        .with_columns(columns)
}

#[async_trait]
impl MetadataStrategy for NotionStrategy {
    fn provider(&self) -> Provider {
        Provider::Notion
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let config = config.notion()?;
        let request = self.request(config, reqwest::Method::GET, "/v1/users/me");
        let me: BotUser = send_json(Provider::Notion, request).await?;

        let name = me
            .bot
            .and_then(|bot| bot.workspace_name)
            .or(me.name)
            .unwrap_or_else(|| "Notion workspace".to_string());

        Ok(vec![DiscoveredDatabase::new(me.id, name)])
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let config = config.notion()?;
        let mut tables = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({
                "filter": { "property": "object", "value": "database" },
                "page_size": 100,
            });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }

            let request = self
                .request(config, reqwest::Method::POST, "/v1/search")
                .json(&body);
            let page: SearchPage = send_json(Provider::Notion, request).await?;

            tables.extend(
                page.results
                    .into_iter()
                    .map(|database| database_to_table(database, &source.external_id)),
            );

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tables)
    }
}
