//! # Common API Types
//!
//! Schema views shared by the edge and connection endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::repositories::{DatabaseSchema, TableSchema};

/// A discovered column
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub ordinal_position: i32,
}

/// A discovered table with its columns
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    pub id: Uuid,
    /// Provider-side identifier
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub columns: Vec<ColumnInfo>,
}

/// A discovered database (base, spreadsheet, schema, bucket …) with its tables
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseInfo {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub tables: Vec<TableInfo>,
}

impl From<TableSchema> for TableInfo {
    fn from(schema: TableSchema) -> Self {
        Self {
            id: schema.table.id,
            external_id: schema.table.external_id,
            name: schema.table.name,
            metadata: schema.table.metadata,
            columns: schema
                .columns
                .into_iter()
                .map(|column| ColumnInfo {
                    name: column.name,
                    data_type: column.data_type,
                    is_nullable: column.is_nullable,
                    is_primary_key: column.is_primary_key,
                    ordinal_position: column.ordinal_position,
                })
                .collect(),
        }
    }
}

impl From<DatabaseSchema> for DatabaseInfo {
    fn from(schema: DatabaseSchema) -> Self {
        Self {
            id: schema.database.id,
            external_id: schema.database.external_id,
            name: schema.database.name,
            metadata: schema.database.metadata,
            tables: schema.tables.into_iter().map(TableInfo::from).collect(),
        }
    }
}

/// Persisted schema of one connection
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchemaResponse {
    pub connection_id: Uuid,
    pub databases: Vec<DatabaseInfo>,
}

impl SchemaResponse {
    pub fn new(connection_id: Uuid, schema: Vec<DatabaseSchema>) -> Self {
        Self {
            connection_id,
            databases: schema.into_iter().map(DatabaseInfo::from).collect(),
        }
    }
}
