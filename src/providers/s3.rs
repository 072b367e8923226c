//! S3 metadata strategy
//!
//! Buckets are sources and `.csv` / `.json` objects are tables. Requests are signed with
//! AWS Signature Version 4 so any S3-compatible endpoint works.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::Url;
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};

use super::config_factory::S3Config;
use super::http::send;
use super::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider,
    ProviderConfig, StrategyError,
};

type HmacSha256 = Hmac<Sha256>;

/// Bytes fetched from the start of an object to read its header row
const SAMPLE_BYTES: u64 = 8 * 1024;

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

static BUCKET_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)<Bucket>(.*?)</Bucket>"));
static CONTENTS_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)<Contents>(.*?)</Contents>"));

fn xml_blocks<'a>(
    pattern: &LazyLock<Result<Regex, regex::Error>>,
    xml: &'a str,
) -> Result<Vec<&'a str>, StrategyError> {
    let regex = pattern
        .as_ref()
        .map_err(|e| StrategyError::malformed(Provider::S3, e.to_string()))?;
    Ok(regex
        .captures_iter(xml)
        .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        .collect())
}

/// Text of the first `<tag>` element inside `xml`
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(unescape_xml(&xml[start..end]))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Percent-encoding per the SigV4 rules: only unreserved characters pass through
fn aws_encode(value: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, StrategyError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StrategyError::connection(Provider::S3, e))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `kSigning` for the given date stamp (`YYYYMMDD`), region and service
fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, StrategyError> {
    let date_key = hmac(format!("AWS4{secret}").as_bytes(), date_stamp)?;
    let region_key = hmac(&date_key, region)?;
    let service_key = hmac(&region_key, service)?;
    hmac(&service_key, "aws4_request")
}

/// Headers to attach to a signed GET request
struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

fn sign_get(
    config: &S3Config,
    url: &Url,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, StrategyError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let host = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (aws_encode(&key, false), aws_encode(&value, false)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut headers = vec![
        ("host", host),
        ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &config.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    // The URL path is already percent-encoded by `Url`; decode first to avoid double encoding
    let raw_path = percent_decode(url.path());
    let canonical_request = format!(
        "GET\n{}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{EMPTY_PAYLOAD_SHA256}",
        aws_encode(&raw_path, true)
    );

    let scope = format!("{date_stamp}/{}/s3/aws4_request", config.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let key = signing_key(&config.secret_access_key, &date_stamp, &config.region, "s3")?;
    let signature = hex::encode(hmac(&key, &string_to_sign)?);

    Ok(SignedHeaders {
        amz_date,
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            config.access_key_id
        ),
    })
}

fn percent_decode(path: &str) -> String {
    url::form_urlencoded::parse(format!("p={}", path.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| path.to_string())
}

pub struct S3Strategy {
    http: reqwest::Client,
}

impl S3Strategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Path-style for custom endpoints, virtual-hosted style on AWS
    fn bucket_url(config: &S3Config, bucket: &str, key: Option<&str>) -> Result<Url, StrategyError> {
        let key_path = key.map(|key| aws_encode(key, true)).unwrap_or_default();
        let raw = match &config.endpoint {
            Some(endpoint) => format!("{endpoint}/{bucket}/{key_path}"),
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{key_path}", config.region),
        };
        Url::parse(&raw).map_err(|e| StrategyError::malformed(Provider::S3, e.to_string()))
    }

    async fn get(
        &self,
        config: &S3Config,
        url: Url,
        range: Option<u64>,
    ) -> Result<reqwest::Response, StrategyError> {
        let signed = sign_get(config, &url, Utc::now())?;
        let mut request = self
            .http
            .get(url)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .header("Authorization", signed.authorization);
        if let Some(token) = &config.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if let Some(bytes) = range {
            request = request.header("Range", format!("bytes=0-{}", bytes - 1));
        }
        send(Provider::S3, request).await
    }

    async fn get_text(
        &self,
        config: &S3Config,
        url: Url,
        range: Option<u64>,
    ) -> Result<String, StrategyError> {
        self.get(config, url, range)
            .await?
            .text()
            .await
            .map_err(|e| StrategyError::malformed(Provider::S3, e.to_string()))
    }

    async fn sample_columns(
        &self,
        config: &S3Config,
        bucket: &str,
        key: &str,
        size: u64,
    ) -> Result<Vec<DiscoveredColumn>, StrategyError> {
        let url = Self::bucket_url(config, bucket, Some(key))?;
        let sample = self.get_text(config, url, Some(SAMPLE_BYTES)).await?;

        if key.to_ascii_lowercase().ends_with(".csv") {
            Ok(csv_header_columns(&sample))
        } else if size <= SAMPLE_BYTES {
            Ok(json_columns(&sample))
        } else {
            // Truncated JSON cannot be parsed
            Ok(Vec::new())
        }
    }
}

fn csv_header_columns(sample: &str) -> Vec<DiscoveredColumn> {
    let header = sample.lines().next().unwrap_or_default().trim_start_matches('\u{feff}');
    split_csv_line(header)
        .into_iter()
        .enumerate()
        .filter(|(_, name)| !name.is_empty())
        .map(|(position, name)| DiscoveredColumn::new(name, "string", position as i32 + 1))
        .collect()
}

/// Split one CSV line honouring double-quoted fields
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Keys of the first record of a JSON array, or of a single JSON object
fn json_columns(sample: &str) -> Vec<DiscoveredColumn> {
    let Ok(value) = serde_json::from_str::<JsonValue>(sample) else {
        return Vec::new();
    };
    let record = match &value {
        JsonValue::Array(items) => items.first(),
        JsonValue::Object(_) => Some(&value),
        _ => None,
    };

    record
        .and_then(JsonValue::as_object)
        .map(|object| {
            object
                .iter()
                .enumerate()
                .map(|(position, (name, field))| {
                    DiscoveredColumn::new(name, json_type_name(field), position as i32 + 1)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_tabular(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with(".csv") || lower.ends_with(".json")
}

#[async_trait]
impl MetadataStrategy for S3Strategy {
    fn provider(&self) -> Provider {
        Provider::S3
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let config = config.s3()?;
        if let Some(bucket) = &config.bucket {
            return Ok(vec![
                DiscoveredDatabase::new(bucket, bucket).with_metadata(json!({ "region": config.region })),
            ]);
        }

        let url = Url::parse(&format!("{}/", config.endpoint()))
            .map_err(|e| StrategyError::malformed(Provider::S3, e.to_string()))?;
        let body = self.get_text(config, url, None).await?;

        Ok(xml_blocks(&BUCKET_RE, &body)?
            .into_iter()
            .filter_map(|block| {
                let name = xml_text(block, "Name")?;
                let created = xml_text(block, "CreationDate");
                Some(
                    DiscoveredDatabase::new(&name, &name)
                        .with_metadata(json!({ "region": config.region, "created_at": created })),
                )
            })
            .collect())
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let config = config.s3()?;
        let bucket = source.external_id.as_str();
        let mut tables = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = Self::bucket_url(config, bucket, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2");
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }
            let body = self.get_text(config, url, None).await?;

            for block in xml_blocks(&CONTENTS_RE, &body)? {
                let Some(key) = xml_text(block, "Key") else {
                    continue;
                };
                if !is_tabular(&key) {
                    continue;
                }
                let size = xml_text(block, "Size")
                    .and_then(|size| size.parse::<u64>().ok())
                    .unwrap_or_default();
                let columns = if size == 0 {
                    Vec::new()
                } else {
                    self.sample_columns(config, bucket, &key, size).await?
                };
                let name = key.rsplit('/').next().unwrap_or(&key).to_string();

                tables.push(
                    DiscoveredTable::new(&key, name)
                        .with_metadata(json!({
                            "bucket": bucket,
                            "size": size,
                            "last_modified": xml_text(block, "LastModified"),
                        }))
                        .with_columns(columns),
                );
            }

            let truncated = xml_text(&body, "IsTruncated").is_some_and(|flag| flag == "true");
            match xml_text(&body, "NextContinuationToken") {
                Some(token) if truncated => continuation = Some(token),
                _ => break,
            }
        }

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiEndpoints;
    use crate::providers::ConfigFactory;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> ProviderConfig {
        ConfigFactory::new(ApiEndpoints::default())
            .build(
                Provider::S3,
                &json!({ "access_key_id": "AKIDEXAMPLE", "secret_access_key": "secret" }),
                &json!({ "region": "us-east-1", "endpoint": endpoint }),
            )
            .unwrap()
    }

    #[test]
    fn signing_key_matches_published_vector() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn aws_encoding_keeps_only_unreserved() {
        assert_eq!(aws_encode("a b/c~d", false), "a%20b%2Fc~d");
        assert_eq!(aws_encode("dir/file name.csv", true), "dir/file%20name.csv");
    }

    #[test]
    fn csv_header_handles_quotes() {
        let columns = csv_header_columns("\u{feff}id,\"last, first\",\"say \"\"hi\"\"\"\n1,2,3");
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "last, first", "say \"hi\""]);
    }

    #[test]
    fn json_columns_from_array_or_object() {
        assert_eq!(json_columns(r#"[{"a":1,"b":"x"}]"#).len(), 2);
        assert_eq!(json_columns(r#"{"a":true}"#)[0].data_type, "boolean");
        assert!(json_columns("[1, 2").is_empty());
    }

    #[tokio::test]
    async fn lists_buckets_with_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListAllMyBucketsResult><Buckets>\
                 <Bucket><Name>exports</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>\
                 <Bucket><Name>r&amp;d</Name></Bucket>\
                 </Buckets></ListAllMyBucketsResult>",
            ))
            .mount(&server)
            .await;

        let strategy = S3Strategy::new(reqwest::Client::new());
        let sources = strategy.get_sources(&config(&server.uri())).await.unwrap();

        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["exports", "r&d"]);

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/s3/aws4_request"));
    }

    #[tokio::test]
    async fn tabular_objects_become_tables() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/exports/"))
            .and(query_param("list-type", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>daily/users.csv</Key><Size>40</Size></Contents>\
                 <Contents><Key>readme.txt</Key><Size>10</Size></Contents>\
                 </ListBucketResult>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/exports/daily/users.csv"))
            .and(header("Range", "bytes=0-8191"))
            .respond_with(ResponseTemplate::new(206).set_body_string("id,email\n1,a@b.c\n"))
            .mount(&server)
            .await;

        let strategy = S3Strategy::new(reqwest::Client::new());
        let tables = strategy
            .get_tables(&config(&server.uri()), &DiscoveredDatabase::new("exports", "exports"))
            .await
            .unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].external_id, "daily/users.csv");
        assert_eq!(tables[0].name, "users.csv");
        assert_eq!(tables[0].columns.len(), 2);
    }
}
