//! Google Sheets metadata strategy
//!
//! Spreadsheets are listed through Drive; each sheet is a table whose header row names the
//! columns.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::config_factory::GoogleSheetsConfig;
use super::http::send_json;
use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    row_count: Option<i64>,
    column_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Numeric id and title of one sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub sheet_id: String,
    pub title: String,
}

pub struct GoogleSheetsStrategy {
    http: reqwest::Client,
}

impl GoogleSheetsStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn spreadsheet(
        &self,
        config: &GoogleSheetsConfig,
        spreadsheet_id: &str,
    ) -> Result<Spreadsheet, StrategyError> {
        let request = self
            .http
            .get(format!(
                "{}/v4/spreadsheets/{}",
                config.sheets_api_base.trim_end_matches('/'),
                spreadsheet_id
            ))
            .bearer_auth(&config.access_token)
            .query(&[("fields", "sheets.properties")]);
        send_json(Provider::GoogleSheets, request).await
    }

    /// Sheet whose title or numeric id is `name`
    pub async fn find_sheet(
        &self,
        config: &GoogleSheetsConfig,
        spreadsheet_id: &str,
        name: &str,
    ) -> Result<Option<SheetRef>, StrategyError> {
        Ok(self
            .spreadsheet(config, spreadsheet_id)
            .await?
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties)
            .find(|properties| properties.title == name || properties.sheet_id.to_string() == name)
            .map(|properties| SheetRef {
                sheet_id: properties.sheet_id.to_string(),
                title: properties.title,
            }))
    }

    async fn header_row(
        &self,
        config: &GoogleSheetsConfig,
        spreadsheet_id: &str,
        title: &str,
    ) -> Result<Vec<String>, StrategyError> {
        // A1 notation needs quotes around titles with spaces; inner quotes are doubled
        let range = format!("'{}'!1:1", title.replace('\'', "''"));
        let url = reqwest::Url::parse(&format!(
            "{}/v4/spreadsheets/{}/values/",
            config.sheets_api_base.trim_end_matches('/'),
            spreadsheet_id
        ))
        .and_then(|base| base.join(&urlencode_segment(&range)))
        .map_err(|e| StrategyError::malformed(Provider::GoogleSheets, e.to_string()))?;

        let request = self.http.get(url).bearer_auth(&config.access_token);
        let values: ValueRange = send_json(Provider::GoogleSheets, request).await?;

        Ok(values
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|cell| match cell {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            })
            .collect())
    }
}

fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait]
impl MetadataStrategy for GoogleSheetsStrategy {
    fn provider(&self) -> Provider {
        Provider::GoogleSheets
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let config = config.google_sheets()?;
        let query = format!("mimeType='{SPREADSHEET_MIME_TYPE}' and trashed=false");
        let url = format!("{}/files", config.drive_api_base.trim_end_matches('/'));
        let mut sources = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("fields", "nextPageToken,files(id,name,modifiedTime)".to_string()),
                ("pageSize", "100".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let request = self
                .http
                .get(&url)
                .bearer_auth(&config.access_token)
                .query(&params);
            let page: FileList = send_json(Provider::GoogleSheets, request).await?;

            sources.extend(page.files.into_iter().map(|file| {
                DiscoveredDatabase::new(file.id, file.name)
                    .with_metadata(json!({ "modified_time": file.modified_time }))
            }));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
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
        let config = config.google_sheets()?;
        let spreadsheet = self.spreadsheet(config, &source.external_id).await?;

        let mut tables = Vec::with_capacity(spreadsheet.sheets.len());
        for sheet in spreadsheet.sheets {
            let properties = sheet.properties;
            let headers = self
                .header_row(config, &source.external_id, &properties.title)
                .await?;

            let columns = headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !header.trim().is_empty())
                .map(|(position, header)| DiscoveredColumn::new(header.trim(), "string", position as i32 + 1))
                .collect();

            let (row_count, column_count) = properties
                .grid_properties
                .map(|grid| (grid.row_count, grid.column_count))
                .unwrap_or_default();

            tables.push(
                DiscoveredTable::new(properties.sheet_id.to_string(), properties.title)
                    .with_metadata(json!({
                        "spreadsheet_id": source.external_id,
                        "index": properties.index,
                        "row_count": row_count,
                        "column_count": column_count,
                    }))
                    .with_columns(columns),
            );
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEndpoints;
    use crate::providers::ConfigFactory;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> ProviderConfig {
        let endpoints = ApiEndpoints {
            google_sheets_api_base: base.to_string(),
            google_drive_api_base: base.to_string(),
            ..ApiEndpoints::default()
        };
        ConfigFactory::new(endpoints)
            .build(Provider::GoogleSheets, &json!({ "access_token": "ya29" }), &json!({}))
            .unwrap()
    }

    #[tokio::test]
    async fn lists_spreadsheets_through_drive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", format!("mimeType='{SPREADSHEET_MIME_TYPE}' and trashed=false")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{ "id": "ss1", "name": "Leads" }]
            })))
            .mount(&server)
            .await;

        let strategy = GoogleSheetsStrategy::new(reqwest::Client::new());
        let sources = strategy.get_sources(&config(&server.uri())).await.unwrap();

        assert_eq!(sources, vec![DiscoveredDatabase::new("ss1", "Leads")
            .with_metadata(json!({ "modified_time": null }))]);
    }

    #[tokio::test]
    async fn header_row_becomes_columns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/ss1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [{ "properties": { "sheetId": 0, "title": "Sheet1", "index": 0 } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/ss1/values/%27Sheet1%27%211%3A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [["Name", "", "Email"]]
            })))
            .mount(&server)
            .await;

        let strategy = GoogleSheetsStrategy::new(reqwest::Client::new());
        let tables = strategy
            .get_tables(&config(&server.uri()), &DiscoveredDatabase::new("ss1", "Leads"))
            .await
            .unwrap();

        assert_eq!(tables[0].external_id, "0");
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Email"]);
        assert_eq!(tables[0].columns[1].ordinal_position, 3);
    }

    #[tokio::test]
    async fn sheet_is_found_by_title_or_id() {
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

        let config = config(&server.uri());
        let sheets = config.google_sheets().unwrap();
        let strategy = GoogleSheetsStrategy::new(reqwest::Client::new());

        let leads = strategy.find_sheet(sheets, "ss1", "Leads").await.unwrap();
        assert_eq!(
            leads,
            Some(SheetRef {
                sheet_id: "1842".to_string(),
                title: "Leads".to_string()
            })
        );
        let by_id = strategy.find_sheet(sheets, "ss1", "0").await.unwrap();
        assert_eq!(by_id.map(|sheet| sheet.title).as_deref(), Some("Sheet1"));
        assert_eq!(strategy.find_sheet(sheets, "ss1", "Missing").await.unwrap(), None);
    }
}
