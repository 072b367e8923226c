//! DataSyncJob entity model
//!
//! Queue row asking the data worker to run one sync, enqueued by the schedule, an inbound
//! webhook or a user.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "data_sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sync_id: Uuid,
    /// See [`super::JobStatus`]
    pub status: String,
    /// See [`super::JobTrigger`]
    pub trigger: String,
    /// Inbound webhook payload for webhook-triggered jobs
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,
    pub message: Option<String>,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub finished_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sync::Entity",
        from = "Column::SyncId",
        to = "super::sync::Column::Id",
        on_delete = "Cascade"
    )]
    Sync,
}

impl Related<super::sync::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sync.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
