//! Connector entity model
//!
//! Catalog row describing a provider type that connections can be created for.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connectors")]
pub struct Model {
    /// Provider slug (primary key), e.g. `airtable`, `postgres`
    #[sea_orm(primary_key, auto_increment = false)]
    pub slug: String,

    /// Human readable provider name
    pub display_name: String,

    /// Authentication scheme: `oauth2`, `api_key` or `credentials`
    pub auth_type: String,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::connection::Entity")]
    Connections,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
