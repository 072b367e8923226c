//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores team-owned accounts of an external provider.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One authenticated instance of a provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Team that owns the connection
    pub team_id: Uuid,

    /// Slug of the connector (provider type)
    pub connector_slug: String,

    /// Display name chosen by the user
    pub name: String,

    /// `active`, `error` or `revoked`
    pub status: String,

    /// AES-GCM encrypted JSON credential blob
    pub credentials_ciphertext: Option<Vec<u8>>,

    /// Non-secret provider parameters (host, base id, bucket, ...)
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Option<JsonValue>,

    /// Expiry of the OAuth access token, when the provider issues one
    pub expires_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connector::Entity",
        from = "Column::ConnectorSlug",
        to = "super::connector::Column::Slug"
    )]
    Connector,
    #[sea_orm(has_many = "super::connection_database::Entity")]
    Databases,
    #[sea_orm(has_many = "super::metadata_sync_job::Entity")]
    MetadataSyncJobs,
}

impl Related<super::connector::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connector.def()
    }
}

impl Related<super::connection_database::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Databases.def()
    }
}

impl Related<super::metadata_sync_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MetadataSyncJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
