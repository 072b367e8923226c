//! MySQL metadata strategy
//!
//! Every non-system database is a source. Primary keys come from `COLUMN_KEY = 'PRI'`.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};

use super::catalog::{self, ColumnRow};
use super::{
    DiscoveredDatabase, DiscoveredTable, MetadataStrategy, Provider, ProviderConfig,
    StrategyError,
};

const SYSTEM_DATABASES: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

const SCHEMATA_SQL: &str = r#"
SELECT SCHEMA_NAME AS schema_name
FROM information_schema.SCHEMATA
ORDER BY SCHEMA_NAME
"#;

const TABLES_SQL: &str = r#"
SELECT TABLE_NAME AS table_name, TABLE_TYPE AS table_type
FROM information_schema.TABLES
WHERE TABLE_SCHEMA = ?
ORDER BY TABLE_NAME
"#;

const COLUMNS_SQL: &str = r#"
SELECT TABLE_NAME AS table_name,
       COLUMN_NAME AS column_name,
       DATA_TYPE AS data_type,
       IS_NULLABLE AS is_nullable,
       COLUMN_KEY AS column_key,
       CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position
FROM information_schema.COLUMNS
WHERE TABLE_SCHEMA = ?
ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

pub struct MySqlStrategy;

impl MySqlStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MySqlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn query_error(error: sea_orm::DbErr) -> StrategyError {
    StrategyError::connection(Provider::MySql, error)
}

fn column_row(row: &QueryResult) -> Result<ColumnRow, sea_orm::DbErr> {
    let ordinal_position: i64 = row.try_get("", "ordinal_position")?;
    Ok(ColumnRow {
        table_name: row.try_get("", "table_name")?,
        column_name: row.try_get("", "column_name")?,
        data_type: row.try_get("", "data_type")?,
        is_nullable: catalog::yes(&row.try_get::<String>("", "is_nullable")?),
        is_primary_key: row.try_get::<String>("", "column_key")? == "PRI",
        ordinal_position: i32::try_from(ordinal_position).unwrap_or(i32::MAX),
    })
}

#[async_trait]
impl MetadataStrategy for MySqlStrategy {
    fn provider(&self) -> Provider {
        Provider::MySql
    }

    async fn get_sources(
        &self,
        config: &ProviderConfig,
    ) -> Result<Vec<DiscoveredDatabase>, StrategyError> {
        let sql = config.sql(Provider::MySql)?;
        let db = catalog::connect(Provider::MySql, sql.url("mysql")).await?;

        let rows = db
            .query_all(Statement::from_string(DatabaseBackend::MySql, SCHEMATA_SQL))
            .await
            .map_err(query_error)?;
        let names = rows
            .iter()
            .map(|row| row.try_get::<String>("", "schema_name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        let _ = db.close().await;

        Ok(names
            .into_iter()
            .filter(|name| !SYSTEM_DATABASES.contains(&name.to_ascii_lowercase().as_str()))
            .map(|name| DiscoveredDatabase::new(&name, &name))
            .collect())
    }

    async fn get_tables(
        &self,
        config: &ProviderConfig,
        source: &DiscoveredDatabase,
    ) -> Result<Vec<DiscoveredTable>, StrategyError> {
        let sql = config.sql(Provider::MySql)?;
        let db = catalog::connect(Provider::MySql, sql.url("mysql")).await?;
        let database = source.external_id.as_str();

        let table_rows = db
            .query_all(Statement::from_sql_and_values(
                DatabaseBackend::MySql,
                TABLES_SQL,
                [database.into()],
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
                DatabaseBackend::MySql,
                COLUMNS_SQL,
                [database.into()],
            ))
            .await
            .map_err(query_error)?;
        let columns = column_rows
            .iter()
            .map(column_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        let _ = db.close().await;

        Ok(catalog::assemble_tables(database, tables, columns))
    }
}
