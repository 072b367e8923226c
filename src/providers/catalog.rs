//! Helpers shared by the SQL strategies

use std::collections::BTreeMap;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::json;

use super::{DiscoveredColumn, DiscoveredTable, Provider, StrategyError};

/// One `information_schema.columns` row after normalization
#[derive(Debug, Clone)]
pub(crate) struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: i32,
}

/// Short-lived single-connection pool for catalog queries
pub(crate) async fn connect(
    provider: Provider,
    url: String,
) -> Result<DatabaseConnection, StrategyError> {
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(1)
        .min_connections(0)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    Database::connect(options)
        .await
        .map_err(|e| StrategyError::connection(provider, e))
}

/// Group column rows under their tables. Tables without visible columns are kept.
pub(crate) fn assemble_tables(
    schema: &str,
    tables: Vec<(String, String)>,
    columns: Vec<ColumnRow>,
) -> Vec<DiscoveredTable> {
    let mut by_table: BTreeMap<String, Vec<DiscoveredColumn>> = BTreeMap::new();
    for row in columns {
        by_table
            .entry(row.table_name)
            .or_default()
            .push(DiscoveredColumn {
                name: row.column_name,
                data_type: row.data_type,
                is_nullable: row.is_nullable,
                is_primary_key: row.is_primary_key,
                ordinal_position: row.ordinal_position,
            });
    }

    tables
        .into_iter()
        .map(|(table_name, table_type)| {
            let mut columns = by_table.remove(&table_name).unwrap_or_default();
            columns.sort_by_key(|column| column.ordinal_position);

            DiscoveredTable::new(format!("{schema}.{table_name}"), table_name)
                .with_metadata(json!({ "schema": schema, "table_type": table_type }))
                .with_columns(columns)
        })
        .collect()
}

/// `YES`/`NO` flags as returned by `information_schema`
pub(crate) fn yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(table: &str, column: &str, position: i32) -> ColumnRow {
        ColumnRow {
            table_name: table.to_string(),
            column_name: column.to_string(),
            data_type: "text".to_string(),
            is_nullable: true,
            is_primary_key: false,
            ordinal_position: position,
        }
    }

    #[test]
    fn columns_are_grouped_and_ordered() {
        let tables = assemble_tables(
            "public",
            vec![
                ("accounts".to_string(), "BASE TABLE".to_string()),
                ("empty_view".to_string(), "VIEW".to_string()),
            ],
            vec![row("accounts", "name", 2), row("accounts", "id", 1)],
        );

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].external_id, "public.accounts");
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert!(tables[1].columns.is_empty());
    }

    #[test]
    fn yes_is_case_insensitive() {
        assert!(yes("YES"));
        assert!(yes("yes"));
        assert!(!yes("NO"));
    }
}
