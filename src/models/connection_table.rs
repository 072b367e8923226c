//! ConnectionTable entity model
//!
//! A discovered table, sheet, collection or object of a [`super::connection_database`] row.
//! `external_id` is the key inbound webhooks are matched on.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connection_tables")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub connection_id: Uuid,
    pub database_id: Uuid,
    pub external_id: String,
    pub name: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connection_database::Entity",
        from = "Column::DatabaseId",
        to = "super::connection_database::Column::Id",
        on_delete = "Cascade"
    )]
    Database,
    #[sea_orm(has_many = "super::connection_column::Entity")]
    Columns,
}

impl Related<super::connection_database::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Database.def()
    }
}

impl Related<super::connection_column::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Columns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
