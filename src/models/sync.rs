//! Sync entity model
//!
//! A sync couples a source table with a destination table of two connections. The builder
//! walks it through [`SyncStage`] until it is `ready` to run.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "syncs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub source_connection_id: Option<Uuid>,
    pub destination_connection_id: Option<Uuid>,
    pub source_table_id: Option<Uuid>,
    pub destination_table_id: Option<Uuid>,
    /// Serialized [`TableMappings`]
    #[sea_orm(column_type = "JsonBinary")]
    pub table_mappings: Option<JsonValue>,
    /// Cron-like schedule, `None` for webhook/manual only syncs
    pub schedule: Option<String>,
    pub conflict_resolution: String,
    pub stage: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::data_sync_job::Entity")]
    DataSyncJobs,
}

impl Related<super::data_sync_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DataSyncJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes `table_mappings`, treating a missing or malformed blob as empty.
    pub fn mappings(&self) -> TableMappings {
        self.table_mappings
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    pub fn stage(&self) -> Option<SyncStage> {
        self.stage.parse().ok()
    }
}

/// Builder lifecycle of a sync, in the order a user completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStage {
    Accounts,
    DataSources,
    Mappings,
    Filters,
    Ready,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Accounts => "accounts",
            SyncStage::DataSources => "data-sources",
            SyncStage::Mappings => "mappings",
            SyncStage::Filters => "filters",
            SyncStage::Ready => "ready",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accounts" => Ok(SyncStage::Accounts),
            "data-sources" => Ok(SyncStage::DataSources),
            "mappings" => Ok(SyncStage::Mappings),
            "filters" => Ok(SyncStage::Filters),
            "ready" => Ok(SyncStage::Ready),
            other => Err(format!("unknown sync stage '{other}'")),
        }
    }
}

/// How conflicting edits on both sides are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    SourceWins,
    DestinationWins,
    LatestWins,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::SourceWins => "source_wins",
            ConflictResolution::DestinationWins => "destination_wins",
            ConflictResolution::LatestWins => "latest_wins",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    OneWay,
    TwoWay,
}

/// Contents of the `table_mappings` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TableMappings {
    #[serde(default)]
    pub direction: SyncDirection,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub filters: Vec<SyncFilter>,
}

/// A source column written into a destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldMapping {
    pub source: String,
    pub destination: String,
    /// Similarity score when the mapping was suggested automatically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SyncFilter {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered_by_builder_flow() {
        assert!(SyncStage::Accounts < SyncStage::DataSources);
        assert!(SyncStage::Filters < SyncStage::Ready);
        assert_eq!("data-sources".parse::<SyncStage>(), Ok(SyncStage::DataSources));
        assert!("done".parse::<SyncStage>().is_err());
    }

    #[test]
    fn table_mappings_tolerate_partial_json() {
        let mappings: TableMappings = serde_json::from_value(serde_json::json!({
            "field_mappings": [{ "source": "Name", "destination": "name" }]
        }))
        .unwrap();

        assert_eq!(mappings.direction, SyncDirection::OneWay);
        assert_eq!(mappings.field_mappings.len(), 1);
        assert!(mappings.filters.is_empty());
    }
}
