//! Per-provider lookup keys inside inbound webhook payloads.

use serde_json::Value as JsonValue;

use crate::providers::Provider;

/// Identifies the stored table a payload is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    /// Value compared against `connection_tables`
    pub key: String,
    /// External id of the source (base, spreadsheet, schema, bucket …) when the payload names one
    pub database: Option<String>,
    /// Compare `key` with the table name instead of its external id
    pub match_name: bool,
}

impl TableKey {
    fn external_id(key: String, database: Option<String>) -> Self {
        Self {
            key,
            database,
            match_name: false,
        }
    }
}

/// Pull the table key for `provider` out of `payload`; `None` when the payload names no table.
pub fn extract_table_key(provider: Provider, payload: &JsonValue) -> Option<TableKey> {
    match provider {
        Provider::Airtable => {
            let base = text_at(payload, &["baseId"]).or_else(|| text_at(payload, &["base", "id"]));
            let table = text_at(payload, &["tableId"]).or_else(|| {
                payload
                    .pointer("/changedTablesById")
                    .and_then(JsonValue::as_object)
                    .and_then(|tables| tables.keys().next().cloned())
            })?;
            Some(TableKey::external_id(table, base))
        }
        Provider::GoogleSheets => {
            let sheet = text_at(payload, &["sheetId"])?;
            Some(TableKey::external_id(sheet, text_at(payload, &["spreadsheetId"])))
        }
        Provider::Notion => {
            let database = text_at(payload, &["database_id"])
                .or_else(|| text_at(payload, &["data", "parent", "id"]))
                .or_else(|| text_at(payload, &["entity", "id"]))?;
            Some(TableKey::external_id(database, None))
        }
        Provider::Supabase | Provider::Postgres | Provider::MySql | Provider::SqlServer => {
            let table = text_at(payload, &["table"]).or_else(|| text_at(payload, &["tableName"]))?;
            let database = text_at(payload, &["database"]).or_else(|| text_at(payload, &["schema"]));
            Some(TableKey {
                key: table,
                database,
                match_name: true,
            })
        }
        Provider::MongoDb => {
            let collection = text_at(payload, &["ns", "coll"])
                .or_else(|| text_at(payload, &["collection"]))?;
            let database =
                text_at(payload, &["ns", "db"]).or_else(|| text_at(payload, &["database"]));
            Some(TableKey::external_id(collection, database))
        }
        Provider::S3 => {
            let record = payload.get("Records")?.get(0)?;
            let key = text_at(record, &["s3", "object", "key"])?;
            Some(TableKey::external_id(
                decode_s3_key(&key),
                text_at(record, &["s3", "bucket", "name"]),
            ))
        }
    }
}

/// String or number at `path`; empty strings count as absent.
fn text_at(value: &JsonValue, path: &[&str]) -> Option<String> {
    let found = path.iter().try_fold(value, |current, segment| current.get(segment))?;
    match found {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Token registered on a Drive watch channel; Drive echoes it in `X-Goog-Channel-Token`.
pub fn drive_channel_token(spreadsheet_id: &str, sheet_id: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("spreadsheetId", spreadsheet_id)
        .append_pair("sheetId", sheet_id)
        .finish()
}

/// Copy `spreadsheetId` and `sheetId` from a channel token into `payload`. Fields already in
/// the body are kept.
pub fn merge_drive_channel_token(payload: &mut JsonValue, token: &str) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };
    for (key, value) in url::form_urlencoded::parse(token.as_bytes()) {
        if matches!(key.as_ref(), "spreadsheetId" | "sheetId") && !value.is_empty() {
            object
                .entry(key.into_owned())
                .or_insert_with(|| JsonValue::String(value.into_owned()));
        }
    }
}

/// S3 event notifications form-encode object keys (`+` for spaces).
fn decode_s3_key(key: &str) -> String {
    url::form_urlencoded::parse(format!("k={key}").as_bytes())
        .next()
        .map(|(_, decoded)| decoded.into_owned())
        .unwrap_or_else(|| key.to_string())
}
