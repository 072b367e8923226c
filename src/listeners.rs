//! # Listener setup
//!
//! Registers provider-side change notifications for one table so that webhooks start
//! arriving at `/webhooks/{provider}`.

use std::sync::LazyLock;

use regex::Regex;
use sea_orm::{ConnectionTrait, DbErr, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::webhooks::drive_channel_token;

use crate::providers::google_sheets::GoogleSheetsStrategy;
use crate::providers::http::send_json;
use crate::providers::postgres::PostgresStrategy;
use crate::providers::{
    ConfigFactory, DiscoveredDatabase, Provider, ProviderConfig, ProviderConfigError,
    StrategyError, StrategyRegistry,
};

static IDENTIFIER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$"));

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listeners are not supported for provider '{0}'")]
    Unsupported(Provider),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error(transparent)]
    Config(#[from] ProviderConfigError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("failed to install database trigger: {0}")]
    Database(#[from] DbErr),
}

/// What the provider handed back for a new subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ListenerRegistration {
    pub provider: Provider,
    /// Provider-side webhook / channel / trigger identifier
    pub listener_id: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Provider specific extras (MAC secret, resource id …)
    #[serde(default)]
    pub details: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirtableWebhook {
    id: String,
    mac_secret_base64: Option<String>,
    expiration_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveChannel {
    id: String,
    resource_id: Option<String>,
    expiration: Option<String>,
}

#[derive(Clone)]
pub struct ListenerService {
    http: reqwest::Client,
    registry: StrategyRegistry,
    factory: ConfigFactory,
    public_base_url: String,
}

impl ListenerService {
    pub fn new(
        http: reqwest::Client,
        registry: StrategyRegistry,
        factory: ConfigFactory,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            registry,
            factory,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn notification_url(&self, provider: Provider) -> String {
        format!("{}/webhooks/{}", self.public_base_url, provider.slug())
    }

    /// `connection_config` holds both credentials and parameters such as `base_id`,
    /// `spreadsheet_id` or `schema`.
    pub async fn setup_listener(
        &self,
        provider: Provider,
        connection_config: &JsonValue,
        table_name: &str,
    ) -> Result<ListenerRegistration, ListenerError> {
        let table_name = table_name.trim();
        if table_name.is_empty() {
            return Err(ListenerError::MissingField("tableName"));
        }

        let registration = match provider {
            Provider::Airtable => {
                let config = self.factory.build(provider, connection_config, &JsonValue::Null)?;
                self.airtable(&config, connection_config, table_name).await?
            }
            Provider::GoogleSheets => {
                let config = self.factory.build(provider, connection_config, &JsonValue::Null)?;
                self.google_sheets(&config, connection_config, table_name)
                    .await?
            }
            Provider::Postgres => {
                let config = self.factory.build(provider, connection_config, &JsonValue::Null)?;
                postgres_trigger(&config, connection_config, table_name).await?
            }
            other => return Err(ListenerError::Unsupported(other)),
        };

        info!(
            %provider,
            table = %registration.table,
            listener_id = %registration.listener_id,
            "Listener registered"
        );
        Ok(registration)
    }

    async fn airtable(
        &self,
        config: &ProviderConfig,
        params: &JsonValue,
        table_name: &str,
    ) -> Result<ListenerRegistration, ListenerError> {
        let airtable = config.airtable()?;
        let base_id = param(params, &["base_id", "baseId"])
            .ok_or(ListenerError::MissingField("base_id"))?;

        let tables = self
            .registry
            .get(Provider::Airtable)?
            .get_tables(config, &DiscoveredDatabase::new(&base_id, &base_id))
            .await?;
        let table = tables
            .into_iter()
            .find(|table| table.name == table_name || table.external_id == table_name)
            .ok_or_else(|| ListenerError::TableNotFound(table_name.to_string()))?;

        let body = json!({
            "notificationUrl": self.notification_url(Provider::Airtable),
            "specification": {
                "options": {
                    "filters": {
                        "dataTypes": ["tableData"],
                        "recordChangeScope": table.external_id,
                    }
                }
            }
        });
        let request = self
            .http
            .post(format!(
                "{}/v0/bases/{}/webhooks",
                airtable.api_base.trim_end_matches('/'),
                base_id
            ))
            .bearer_auth(&airtable.access_token)
            .json(&body);
        let webhook: AirtableWebhook = send_json(Provider::Airtable, request).await?;

        Ok(ListenerRegistration {
            provider: Provider::Airtable,
            listener_id: webhook.id,
            table: table.external_id,
            expires_at: webhook.expiration_time,
            details: json!({ "base_id": base_id, "mac_secret_base64": webhook.mac_secret_base64 }),
        })
    }

    async fn google_sheets(
        &self,
        config: &ProviderConfig,
        params: &JsonValue,
        table_name: &str,
    ) -> Result<ListenerRegistration, ListenerError> {
        let sheets = config.google_sheets()?;
        let spreadsheet_id = param(params, &["spreadsheet_id", "spreadsheetId"])
            .ok_or(ListenerError::MissingField("spreadsheet_id"))?;

        let sheet = GoogleSheetsStrategy::new(self.http.clone())
            .find_sheet(sheets, &spreadsheet_id, table_name)
            .await?
            .ok_or_else(|| ListenerError::TableNotFound(table_name.to_string()))?;

        // Drive watches the whole file; the sheet id comes back in the channel token
        let body = json!({
            "id": Uuid::new_v4().to_string(),
            "type": "web_hook",
            "address": self.notification_url(Provider::GoogleSheets),
            "token": drive_channel_token(&spreadsheet_id, &sheet.sheet_id),
        });
        let request = self
            .http
            .post(format!(
                "{}/files/{}/watch",
                sheets.drive_api_base.trim_end_matches('/'),
                spreadsheet_id
            ))
            .bearer_auth(&sheets.access_token)
            .json(&body);
        let channel: DriveChannel = send_json(Provider::GoogleSheets, request).await?;

        Ok(ListenerRegistration {
            provider: Provider::GoogleSheets,
            listener_id: channel.id,
            table: sheet.sheet_id,
            expires_at: channel.expiration,
            details: json!({
                "spreadsheet_id": spreadsheet_id,
                "sheet_title": sheet.title,
                "resource_id": channel.resource_id,
            }),
        })
    }
}

/// `AFTER INSERT OR UPDATE OR DELETE` trigger calling `pg_notify('syncflow_changes', …)`.
async fn postgres_trigger(
    config: &ProviderConfig,
    params: &JsonValue,
    table_name: &str,
) -> Result<ListenerRegistration, ListenerError> {
    let schema = param(params, &["schema"]).unwrap_or_else(|| "public".to_string());
    let table = identifier(table_name)?;
    let schema = identifier(&schema)?;
    let function = format!("syncflow_notify_{table}");

    let statements = trigger_statements(schema, table, &function);
    let db = PostgresStrategy::connect(config).await?;
    let backend = db.get_database_backend();
    for sql in statements {
        db.execute(Statement::from_string(backend, sql)).await?;
    }
    let _ = db.close().await;

    Ok(ListenerRegistration {
        provider: Provider::Postgres,
        listener_id: function,
        table: table.to_string(),
        expires_at: None,
        details: json!({ "schema": schema, "channel": "syncflow_changes" }),
    })
}

fn trigger_statements(schema: &str, table: &str, function: &str) -> [String; 3] {
    [
        format!(
            r#"CREATE OR REPLACE FUNCTION "{schema}"."{function}"() RETURNS trigger AS $$
BEGIN
  PERFORM pg_notify('syncflow_changes', json_build_object(
    'provider', 'postgres',
    'schema', TG_TABLE_SCHEMA,
    'table', TG_TABLE_NAME,
    'operation', TG_OP
  )::text);
  RETURN NULL;
END;
$$ LANGUAGE plpgsql"#
        ),
        format!(r#"DROP TRIGGER IF EXISTS "{function}" ON "{schema}"."{table}""#),
        format!(
            r#"CREATE TRIGGER "{function}" AFTER INSERT OR UPDATE OR DELETE ON "{schema}"."{table}" FOR EACH ROW EXECUTE FUNCTION "{schema}"."{function}"()"#
        ),
    ]
}

/// Only plain SQL identifiers are interpolated into DDL.
fn identifier(value: &str) -> Result<&str, ListenerError> {
    match IDENTIFIER.as_ref() {
        Ok(re) if re.is_match(value) => Ok(value),
        _ => Err(ListenerError::InvalidIdentifier(value.to_string())),
    }
}

fn param(params: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| params.get(key).and_then(JsonValue::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEndpoints;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(api_base: &str) -> ListenerService {
        let endpoints = ApiEndpoints {
            airtable_api_base: api_base.to_string(),
            google_sheets_api_base: api_base.to_string(),
            google_drive_api_base: api_base.to_string(),
            ..ApiEndpoints::default()
        };
        let http = reqwest::Client::new();
        ListenerService::new(
            http.clone(),
            StrategyRegistry::with_defaults(http),
            ConfigFactory::new(endpoints),
            "https://sync.example.com/",
        )
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(identifier("orders").is_ok());
        assert!(identifier("_audit_2024").is_ok());
        assert!(identifier("orders; DROP TABLE users").is_err());
        assert!(identifier("1orders").is_err());
        assert!(identifier("").is_err());
    }

    #[test]
    fn trigger_ddl_targets_the_table() {
        let [function, drop_trigger, create] =
            trigger_statements("public", "orders", "syncflow_notify_orders");
        assert!(function.contains(r#""public"."syncflow_notify_orders"()"#));
        assert!(function.contains("pg_notify('syncflow_changes'"));
        assert!(drop_trigger.contains(r#"ON "public"."orders""#));
        assert!(create.contains("AFTER INSERT OR UPDATE OR DELETE"));
    }

    #[tokio::test]
    async fn unsupported_provider_is_rejected() {
        let result = service("http://unused.invalid")
            .setup_listener(Provider::MongoDb, &json!({ "uri": "mongodb://x" }), "carts")
            .await;
        assert!(matches!(result, Err(ListenerError::Unsupported(Provider::MongoDb))));
    }

    #[tokio::test]
    async fn airtable_webhook_is_created_for_named_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/meta/bases/appX/tables"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tables": [
                    { "id": "tblOther", "name": "Other", "fields": [] },
                    { "id": "tblLeads", "name": "Leads", "primaryFieldId": "fld1",
                      "fields": [{ "id": "fld1", "name": "Name", "type": "singleLineText" }] }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v0/bases/appX/webhooks"))
            .and(header("authorization", "Bearer pat123"))
            .and(body_partial_json(json!({
                "notificationUrl": "https://sync.example.com/webhooks/airtable",
                "specification": { "options": { "filters": { "recordChangeScope": "tblLeads" } } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ach1",
                "macSecretBase64": "c2VjcmV0",
                "expirationTime": "2026-11-01T00:00:00.000Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registration = service(&server.uri())
            .setup_listener(
                Provider::Airtable,
                &json!({ "api_key": "pat123", "base_id": "appX" }),
                "Leads",
            )
            .await
            .unwrap();

        assert_eq!(registration.listener_id, "ach1");
        assert_eq!(registration.table, "tblLeads");
        assert_eq!(registration.details["mac_secret_base64"], "c2VjcmV0");
    }

    #[tokio::test]
    async fn airtable_requires_base_id() {
        let result = service("http://unused.invalid")
            .setup_listener(Provider::Airtable, &json!({ "api_key": "pat123" }), "Leads")
            .await;
        assert!(matches!(result, Err(ListenerError::MissingField("base_id"))));
    }

    #[tokio::test]
    async fn sheets_watch_channel_is_opened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/ss1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    { "properties": { "sheetId": 0, "title": "Sheet1" } },
                    { "properties": { "sheetId": 1842, "title": "Leads" } }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/ss1/watch"))
            .and(body_partial_json(json!({
                "type": "web_hook",
                "address": "https://sync.example.com/webhooks/google_sheets",
                "token": "spreadsheetId=ss1&sheetId=1842"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "api#channel",
                "id": "chan-1",
                "resourceId": "res-1",
                "expiration": "1790000000000"
            })))
            .mount(&server)
            .await;

        let registration = service(&server.uri())
            .setup_listener(
                Provider::GoogleSheets,
                &json!({ "access_token": "ya29", "spreadsheet_id": "ss1" }),
                "Leads",
            )
            .await
            .unwrap();

        assert_eq!(registration.listener_id, "chan-1");
        assert_eq!(registration.table, "1842");
        assert_eq!(registration.details["sheet_title"], "Leads");
        assert_eq!(registration.details["resource_id"], "res-1");
    }

    #[tokio::test]
    async fn sheets_listener_needs_an_existing_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/ss1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "sheetId": 0, "title": "Sheet1" } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/files/ss1/watch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "chan-1" })))
            .expect(0)
            .mount(&server)
            .await;

        let result = service(&server.uri())
            .setup_listener(
                Provider::GoogleSheets,
                &json!({ "access_token": "ya29", "spreadsheet_id": "ss1" }),
                "Leads",
            )
            .await;
        assert!(matches!(result, Err(ListenerError::TableNotFound(name)) if name == "Leads"));
    }
}
