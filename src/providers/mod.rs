//! Provider strategies
//!
//! One module per external system. Each strategy implements [`MetadataStrategy`] over the
//! provider's native client and reports what it finds as [`DiscoveredDatabase`] /
//! [`DiscoveredTable`] values; persistence is handled by [`crate::discovery`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod airtable;
mod catalog;
pub mod config_factory;
pub mod google_sheets;
pub(crate) mod http;
pub mod mongodb;
pub mod mysql;
pub mod notion;
pub mod postgres;
pub mod registry;
pub mod s3;
pub mod sql_server;
pub mod strategy;
pub mod supabase;

pub use config_factory::{ConfigFactory, ProviderConfig, ProviderConfigError};
pub use registry::StrategyRegistry;
pub use strategy::{
    DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, MetadataStrategy, StrategyError,
};

/// External system types a connection can target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum Provider {
    #[serde(rename = "airtable")]
    Airtable,
    #[serde(rename = "google_sheets")]
    GoogleSheets,
    #[serde(rename = "notion")]
    Notion,
    #[serde(rename = "supabase")]
    Supabase,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "mongodb")]
    MongoDb,
    #[serde(rename = "sqlserver")]
    SqlServer,
    #[serde(rename = "s3")]
    S3,
}

/// How a connector authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// OAuth 2.0 access/refresh token pair
    #[serde(rename = "oauth2")]
    OAuth2,
    /// Personal access token or integration secret
    ApiKey,
    /// Host/user/password or access key pair
    Credentials,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::OAuth2 => "oauth2",
            AuthType::ApiKey => "api_key",
            AuthType::Credentials => "credentials",
        }
    }
}

impl Provider {
    pub const ALL: [Provider; 9] = [
        Provider::Airtable,
        Provider::GoogleSheets,
        Provider::Notion,
        Provider::Supabase,
        Provider::Postgres,
        Provider::MySql,
        Provider::MongoDb,
        Provider::SqlServer,
        Provider::S3,
    ];

    /// Stable identifier used in URLs, the `connectors` table and webhook payloads.
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::Airtable => "airtable",
            Provider::GoogleSheets => "google_sheets",
            Provider::Notion => "notion",
            Provider::Supabase => "supabase",
            Provider::Postgres => "postgres",
            Provider::MySql => "mysql",
            Provider::MongoDb => "mongodb",
            Provider::SqlServer => "sqlserver",
            Provider::S3 => "s3",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Airtable => "Airtable",
            Provider::GoogleSheets => "Google Sheets",
            Provider::Notion => "Notion",
            Provider::Supabase => "Supabase",
            Provider::Postgres => "PostgreSQL",
            Provider::MySql => "MySQL",
            Provider::MongoDb => "MongoDB",
            Provider::SqlServer => "SQL Server",
            Provider::S3 => "Amazon S3",
        }
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            Provider::Airtable | Provider::GoogleSheets => AuthType::OAuth2,
            Provider::Notion | Provider::Supabase => AuthType::ApiKey,
            Provider::Postgres
            | Provider::MySql
            | Provider::MongoDb
            | Provider::SqlServer
            | Provider::S3 => AuthType::Credentials,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider '{0}'")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    /// Accepts slugs case-insensitively, plus the common `-`/space separated spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect();

        match normalized.as_str() {
            "airtable" => Ok(Provider::Airtable),
            "googlesheets" | "sheets" => Ok(Provider::GoogleSheets),
            "notion" => Ok(Provider::Notion),
            "supabase" => Ok(Provider::Supabase),
            "postgres" | "postgresql" => Ok(Provider::Postgres),
            "mysql" => Ok(Provider::MySql),
            "mongodb" | "mongo" => Ok(Provider::MongoDb),
            "sqlserver" | "mssql" => Ok(Provider::SqlServer),
            "s3" => Ok(Provider::S3),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip_through_from_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.slug().parse::<Provider>(), Ok(provider));
        }
    }

    #[test]
    fn from_str_accepts_common_spellings() {
        assert_eq!("Google-Sheets".parse(), Ok(Provider::GoogleSheets));
        assert_eq!("PostgreSQL".parse(), Ok(Provider::Postgres));
        assert_eq!("MSSQL".parse(), Ok(Provider::SqlServer));
        assert!("dropbox".parse::<Provider>().is_err());
    }

    #[test]
    fn serde_uses_slugs() {
        assert_eq!(
            serde_json::to_value(Provider::SqlServer).unwrap(),
            serde_json::json!("sqlserver")
        );
        let provider: Provider = serde_json::from_value(serde_json::json!("google_sheets")).unwrap();
        assert_eq!(provider, Provider::GoogleSheets);
    }
}
