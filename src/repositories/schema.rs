//! # Schema Repository
//!
//! Persistence for discovered schema: `connection_databases`, `connection_tables` and
//! `connection_columns`. Rows are upserted on their natural keys so repeated discovery runs
//! keep stable ids, which syncs reference.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::models::{connection_column, connection_database, connection_table};
use crate::providers::{DiscoveredColumn, DiscoveredDatabase, DiscoveredTable};

/// A persisted table with its columns
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: connection_table::Model,
    pub columns: Vec<connection_column::Model>,
}

/// A persisted database with its tables
#[derive(Debug, Clone)]
pub struct DatabaseSchema {
    pub database: connection_database::Model,
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone)]
pub struct SchemaRepository {
    db: DatabaseConnection,
}

impl SchemaRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh one source of `connection_id`
    pub async fn upsert_database(
        &self,
        connection_id: Uuid,
        discovered: &DiscoveredDatabase,
    ) -> Result<connection_database::Model> {
        use connection_database::{ActiveModel, Column, Entity};

        let now = Utc::now().fixed_offset();
        let existing = Entity::find()
            .filter(Column::ConnectionId.eq(connection_id))
            .filter(Column::ExternalId.eq(discovered.external_id.as_str()))
            .one(&self.db)
            .await?;

        let model = match existing {
            Some(row) => {
                let mut active: ActiveModel = row.into();
                active.name = Set(discovered.name.clone());
                active.metadata = Set(discovered.metadata.clone());
                active.updated_at = Set(now);
                active.update(&self.db).await?
            }
            None => {
                ActiveModel {
                    id: Set(Uuid::new_v4()),
                    connection_id: Set(connection_id),
                    external_id: Set(discovered.external_id.clone()),
                    name: Set(discovered.name.clone()),
                    metadata: Set(discovered.metadata.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.db)
                .await?
            }
        };

        Ok(model)
    }

    /// Insert or refresh one table and replace its columns
    pub async fn upsert_table(
        &self,
        connection_id: Uuid,
        database_id: Uuid,
        discovered: &DiscoveredTable,
    ) -> Result<TableSchema> {
        use connection_table::{ActiveModel, Column, Entity};

        let txn = self.db.begin().await?;
        let now = Utc::now().fixed_offset();

        let existing = Entity::find()
            .filter(Column::DatabaseId.eq(database_id))
            .filter(Column::ExternalId.eq(discovered.external_id.as_str()))
            .one(&txn)
            .await?;

        let table = match existing {
            Some(row) => {
                let mut active: ActiveModel = row.into();
                active.name = Set(discovered.name.clone());
                active.metadata = Set(discovered.metadata.clone());
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                ActiveModel {
                    id: Set(Uuid::new_v4()),
                    connection_id: Set(connection_id),
                    database_id: Set(database_id),
                    external_id: Set(discovered.external_id.clone()),
                    name: Set(discovered.name.clone()),
                    metadata: Set(discovered.metadata.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?
            }
        };

        let columns = replace_columns(&txn, table.id, &discovered.columns).await?;
        txn.commit().await?;

        Ok(TableSchema { table, columns })
    }

    /// Delete tables of `database_id` that are not in `keep`
    pub async fn prune_tables(&self, database_id: Uuid, keep: &[Uuid]) -> Result<u64> {
        use connection_table::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::DatabaseId.eq(database_id))
            .filter(Column::Id.is_not_in(keep.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Delete databases of `connection_id` that are not in `keep`
    pub async fn prune_databases(&self, connection_id: Uuid, keep: &[Uuid]) -> Result<u64> {
        use connection_database::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::ConnectionId.eq(connection_id))
            .filter(Column::Id.is_not_in(keep.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Remove everything discovered for `connection_id`.
    ///
    /// Only `connection_databases` rows are deleted here; tables and columns go with them
    /// through the foreign key cascade.
    pub async fn rollback_database_sync(&self, connection_id: Uuid) -> Result<u64> {
        use connection_database::{Column, Entity};

        let result = Entity::delete_many()
            .filter(Column::ConnectionId.eq(connection_id))
            .exec(&self.db)
            .await?;

        tracing::info!(
            connection_id = %connection_id,
            databases_deleted = result.rows_affected,
            "Rolled back discovered schema"
        );
        Ok(result.rows_affected)
    }

    /// Full persisted schema of a connection, ordered by name
    pub async fn load_schema(&self, connection_id: Uuid) -> Result<Vec<DatabaseSchema>> {
        let databases = connection_database::Entity::find()
            .filter(connection_database::Column::ConnectionId.eq(connection_id))
            .order_by_asc(connection_database::Column::Name)
            .all(&self.db)
            .await?;
        let tables = connection_table::Entity::find()
            .filter(connection_table::Column::ConnectionId.eq(connection_id))
            .order_by_asc(connection_table::Column::Name)
            .all(&self.db)
            .await?;
        let columns = connection_column::Entity::find()
            .filter(connection_column::Column::TableId.is_in(tables.iter().map(|t| t.id)))
            .order_by_asc(connection_column::Column::OrdinalPosition)
            .all(&self.db)
            .await?;

        let mut columns_by_table: HashMap<Uuid, Vec<connection_column::Model>> = HashMap::new();
        for column in columns {
            columns_by_table.entry(column.table_id).or_default().push(column);
        }

        let mut tables_by_database: HashMap<Uuid, Vec<TableSchema>> = HashMap::new();
        for table in tables {
            let columns = columns_by_table.remove(&table.id).unwrap_or_default();
            tables_by_database
                .entry(table.database_id)
                .or_default()
                .push(TableSchema { table, columns });
        }

        Ok(databases
            .into_iter()
            .map(|database| DatabaseSchema {
                tables: tables_by_database.remove(&database.id).unwrap_or_default(),
                database,
            })
            .collect())
    }

    pub async fn find_table(&self, table_id: Uuid) -> Result<Option<TableSchema>> {
        let Some(table) = connection_table::Entity::find_by_id(table_id)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let columns = connection_column::Entity::find()
            .filter(connection_column::Column::TableId.eq(table.id))
            .order_by_asc(connection_column::Column::OrdinalPosition)
            .all(&self.db)
            .await?;
        Ok(Some(TableSchema { table, columns }))
    }

    /// Tables of the given connections whose `external_id` or `name` equals `key`,
    /// optionally restricted to one source by its external id
    pub async fn find_tables_by_key(
        &self,
        connection_ids: &[Uuid],
        key: &str,
        match_name: bool,
        database_external_id: Option<&str>,
    ) -> Result<Vec<connection_table::Model>> {
        use connection_table::{Column, Entity};

        if connection_ids.is_empty() {
            return Ok(Vec::new());
        }

        let key_column = if match_name { Column::Name } else { Column::ExternalId };
        let mut query = Entity::find()
            .filter(Column::ConnectionId.is_in(connection_ids.iter().copied()))
            .filter(key_column.eq(key));

        if let Some(database_external_id) = database_external_id {
            let database_ids: Vec<Uuid> = connection_database::Entity::find()
                .filter(
                    connection_database::Column::ConnectionId
                        .is_in(connection_ids.iter().copied()),
                )
                .filter(connection_database::Column::ExternalId.eq(database_external_id))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|database| database.id)
                .collect();
            query = query.filter(Column::DatabaseId.is_in(database_ids));
        }

        Ok(query.all(&self.db).await?)
    }
}

async fn replace_columns<C: ConnectionTrait>(
    db: &C,
    table_id: Uuid,
    discovered: &[DiscoveredColumn],
) -> Result<Vec<connection_column::Model>> {
    use connection_column::{ActiveModel, Column, Entity};

    Entity::delete_many()
        .filter(Column::TableId.eq(table_id))
        .exec(db)
        .await?;

    let now = Utc::now().fixed_offset();
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(discovered.len());
    // Column names are unique per table; spreadsheets can repeat a header
    for column in discovered.iter().filter(|c| seen.insert(c.name.clone())) {
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            table_id: Set(table_id),
            name: Set(column.name.clone()),
            data_type: Set(column.data_type.clone()),
            is_nullable: Set(column.is_nullable),
            is_primary_key: Set(column.is_primary_key),
            ordinal_position: Set(column.ordinal_position),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;
        columns.push(model);
    }
    Ok(columns)
}
