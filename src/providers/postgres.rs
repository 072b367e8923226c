//! Postgres metadata strategy
//!
//! Non-system schemas are sources; `information_schema` provides tables, columns and
//! primary keys.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, QueryResult, Statement};

use super::catalog::{self, ColumnRow};
use super::{
    DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider, ProviderConfig,
    StrategyError,
};

const SCHEMAS_SQL: &str = r#"
SELECT schema_name::text AS schema_name
FROM information_schema.schemata
WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
  AND schema_name NOT LIKE 'pg_temp_%'
  AND schema_name NOT LIKE 'pg_toast_temp_%'
ORDER BY schema_name
"#;

const TABLES_SQL: &str = r#"
SELECT table_name::text AS table_name, table_type::text AS table_type
FROM information_schema.tables
WHERE table_schema = $1 AND table_type IN ('BASE TABLE', 'VIEW')
ORDER BY table_name
"#;

const COLUMNS_SQL: &str = r#"
SELECT c.table_name::text AS table_name,
       c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       c.is_nullable::text AS is_nullable,
       c.ordinal_position::int AS ordinal_position,
       EXISTS (
           SELECT 1
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
             ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
           WHERE tc.constraint_type = 'PRIMARY KEY'
             AND tc.table_schema = c.table_schema
             AND tc.table_name = c.table_name
             AND kcu.column_name = c.column_name
       ) AS is_primary_key
FROM information_schema.columns c
WHERE c.table_schema = $1
ORDER BY c.table_name, c.ordinal_position
"#;

pub struct PostgresStrategy;

impl PostgresStrategy {
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn connect(config: &ProviderConfig) -> Result<DatabaseConnection, StrategyError> {
        let sql = config.sql(Provider::Postgres)?;
        catalog::connect(Provider::Postgres, sql.url("postgres")).await
    }
}

impl Default for PostgresStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn query_error(error: sea_orm::DbErr) -> StrategyError {
    StrategyError::connection(Provider::Postgres, error)
}

fn column_row(row: &QueryResult) -> Result<ColumnRow, sea_orm::DbErr> {
    Ok(ColumnRow {
        table_name: row.try_get("", "table_name")?,
        column_name: row.try_get("", "column_name")?,
        data_type: row.try_get("", "data_type")?,
        is_nullable: catalog::yes(&row.try_get::<String>("", "is_nullable")?),
        is_primary_key: row.try_get("", "is_primary_key")?,
        ordinal_position: row.try_get("", "ordinal_position")?,
    })
}

#[async_trait]
impl MetadataStrategy for PostgresStrategy {
    fn provider(&self) -> Provider {
        Provider::Postgres
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let db = Self::connect(config).await?;
        let rows = db
            .query_all(Statement::from_string(DatabaseBackend::Postgres, SCHEMAS_SQL))
            .await
            .map_err(query_error)?;

        let schemas = rows
            .iter()
            .map(|row| row.try_get::<String>("", "schema_name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        let _ = db.close().await;

        Ok(schemas
            .into_iter()
            .map(|schema| DiscoveredDatabase::new(&schema, &schema))
            .collect())
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let db = Self::connect(config).await?;
        let schema = source.external_id.as_str();

        let table_rows = db
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                TABLES_SQL,
                [schema.into()],
            ))
            .await
            .map_err(query_error)?;
        let tables = table_rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String>("", "table_name")?,
                    row.try_get::<String>("", "table_type")?,
                ))
            })
            .collect::<Result<Vec<_>, sea_orm::DbErr>>()
            .map_err(query_error)?;

        let column_rows = db
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                COLUMNS_SQL,
                [schema.into()],
            ))
            .await
            .map_err(query_error)?;
        let columns = column_rows
            .iter()
            .map(column_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        let _ = db.close().await;

        Ok(catalog::assemble_tables(schema, tables, columns))
    }
}
