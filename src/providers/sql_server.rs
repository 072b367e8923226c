//! SQL Server metadata strategy
//!
//! Uses tiberius directly; user databases are sources and each database's
//! `INFORMATION_SCHEMA` describes its tables.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, QueryItem, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::catalog::{self, ColumnRow};
use super::config_factory::SqlConfig;
use super::{
    DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider, ProviderConfig,
    StrategyError,
};

type SqlServerClient = Client<Compat<TcpStream>>;

/// master, tempdb, model and msdb
const MAX_SYSTEM_DATABASE_ID: i32 = 4;

const DATABASES_SQL: &str = r#"
SELECT name
FROM sys.databases
WHERE database_id > @P1 AND state_desc = 'ONLINE'
ORDER BY name
"#;

pub struct SqlServerStrategy;

impl SqlServerStrategy {
    pub fn new() -> Self {
        Self
    }

    async fn connect(config: &ProviderConfig) -> Result<SqlServerClient, StrategyError> {
        let config = client_config(config.sql(Provider::SqlServer)?)?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| StrategyError::connection(Provider::SqlServer, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| StrategyError::connection(Provider::SqlServer, e))?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| match e {
                tiberius::error::Error::Server(ref token) if token.code() == 18456 => {
                    StrategyError::Unauthorized {
                        provider: Provider::SqlServer,
                    }
                }
                other => StrategyError::connection(Provider::SqlServer, other),
            })
    }
}

impl Default for SqlServerStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// A raw ADO.NET string when given; otherwise setters, so values need no quoting
fn client_config(sql: &SqlConfig) -> Result<Config, StrategyError> {
    if let Some(connection_string) = &sql.connection_string {
        return Config::from_ado_string(connection_string)
            .map_err(|e| StrategyError::connection(Provider::SqlServer, e));
    }

    let mut config = Config::new();
    config.host(&sql.host);
    config.port(sql.port);
    config.database(&sql.database);
    config.authentication(AuthMethod::sql_server(&sql.user, &sql.password));
    config.encryption(if sql.ssl {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    config.trust_cert();
    Ok(config)
}

fn query_error(error: tiberius::error::Error) -> StrategyError {
    StrategyError::connection(Provider::SqlServer, error)
}

async fn collect_rows(
    client: &mut SqlServerClient,
    query: Query<'_>,
) -> Result<Vec<Row>, StrategyError> {
    let mut stream = query.query(client).await.map_err(query_error)?;
    let mut rows = Vec::new();
    while let Some(item) = stream.try_next().await.map_err(query_error)? {
        if let QueryItem::Row(row) = item {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn text(row: &Row, column: &str) -> Result<String, StrategyError> {
    row.try_get::<&str, _>(column)
        .map_err(query_error)?
        .map(str::to_string)
        .ok_or_else(|| StrategyError::malformed(Provider::SqlServer, format!("{column} is NULL")))
}

/// Bracket-quote an identifier that cannot be bound as a parameter
fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

fn tables_sql(database: &str) -> String {
    format!(
        "SELECT TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE \
         FROM {db}.INFORMATION_SCHEMA.TABLES \
         ORDER BY TABLE_SCHEMA, TABLE_NAME",
        db = quote_identifier(database)
    )
}

fn columns_sql(database: &str) -> String {
    format!(
        "SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, \
                CAST(c.ORDINAL_POSITION AS int) AS ORDINAL_POSITION, \
                CASE WHEN k.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS IS_PRIMARY_KEY \
         FROM {db}.INFORMATION_SCHEMA.COLUMNS c \
         LEFT JOIN ( \
             SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME \
             FROM {db}.INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
             JOIN {db}.INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
              AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
             WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
         ) k ON k.TABLE_SCHEMA = c.TABLE_SCHEMA \
            AND k.TABLE_NAME = c.TABLE_NAME \
            AND k.COLUMN_NAME = c.COLUMN_NAME \
         ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
        db = quote_identifier(database)
    )
}

#[async_trait]
impl MetadataStrategy for SqlServerStrategy {
    fn provider(&self) -> Provider {
        Provider::SqlServer
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let mut client = Self::connect(config).await?;

        let mut query = Query::new(DATABASES_SQL);
        query.bind(MAX_SYSTEM_DATABASE_ID);
        let rows = collect_rows(&mut client, query).await?;

        rows.iter()
            .map(|row| text(row, "name").map(|name| DiscoveredDatabase::new(&name, &name)))
            .collect()
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let mut client = Self::connect(config).await?;
        let database = source.external_id.as_str();

        let table_rows = collect_rows(&mut client, Query::new(tables_sql(database))).await?;
        let column_rows = collect_rows(&mut client, Query::new(columns_sql(database))).await?;

        // Tables are reported per schema so external ids read `schema.table`
        let mut tables_by_schema: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for row in &table_rows {
            tables_by_schema
                .entry(text(row, "TABLE_SCHEMA")?)
                .or_default()
                .push((text(row, "TABLE_NAME")?, text(row, "TABLE_TYPE")?));
        }

        let mut columns_by_schema: BTreeMap<String, Vec<ColumnRow>> = BTreeMap::new();
        for row in &column_rows {
            let ordinal_position = row
                .try_get::<i32, _>("ORDINAL_POSITION")
                .map_err(query_error)?
                .unwrap_or_default();
            let is_primary_key = row
                .try_get::<i32, _>("IS_PRIMARY_KEY")
                .map_err(query_error)?
                .unwrap_or_default()
                == 1;

            columns_by_schema
                .entry(text(row, "TABLE_SCHEMA")?)
                .or_default()
                .push(ColumnRow {
                    table_name: text(row, "TABLE_NAME")?,
                    column_name: text(row, "COLUMN_NAME")?,
                    data_type: text(row, "DATA_TYPE")?,
                    is_nullable: catalog::yes(&text(row, "IS_NULLABLE")?),
                    is_primary_key,
                    ordinal_position,
                });
        }

        Ok(tables_by_schema
            .into_iter()
            .flat_map(|(schema, tables)| {
                let columns = columns_by_schema.remove(&schema).unwrap_or_default();
                catalog::assemble_tables(&schema, tables, columns)
            })
            .map(|table| {
                let mut metadata = table.metadata.clone().unwrap_or_default();
                metadata["database"] = serde_json::json!(database);
                table.with_metadata(metadata)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_bracket_quoted() {
        assert_eq!(quote_identifier("sales"), "[sales]");
        assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
        assert!(tables_sql("crm").contains("[crm].INFORMATION_SCHEMA.TABLES"));
    }

    fn sql_config(password: &str, connection_string: Option<&str>) -> SqlConfig {
        SqlConfig {
            connection_string: connection_string.map(str::to_string),
            host: "mssql.internal".to_string(),
            port: 1433,
            user: "sa".to_string(),
            password: password.to_string(),
            database: "crm".to_string(),
            ssl: false,
        }
    }

    #[test]
    fn separators_in_credentials_do_not_split_the_config() {
        let config = client_config(&sql_config("pa;ss=word;server=evil", None)).unwrap();
        assert_eq!(config.get_addr(), "mssql.internal:1433");
    }

    #[test]
    fn raw_connection_string_is_parsed_as_ado() {
        let raw = "server=tcp:other.host,14330;user=sa;password=x;database=crm";
        let config = client_config(&sql_config("ignored", Some(raw))).unwrap();
        assert_eq!(config.get_addr(), "other.host:14330");
    }
}
