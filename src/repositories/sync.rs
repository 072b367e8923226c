//! Sync repository
//!
//! Reads and updates user-defined syncs.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::models::sync::{self, ConflictResolution, Entity as Syncs, SyncStage, TableMappings};

/// Input for [`SyncRepository::create`]
#[derive(Debug, Clone)]
pub struct NewSync {
    pub team_id: Uuid,
    pub name: String,
    pub source_connection_id: Option<Uuid>,
    pub destination_connection_id: Option<Uuid>,
    pub source_table_id: Option<Uuid>,
    pub destination_table_id: Option<Uuid>,
    pub schedule: Option<String>,
    pub conflict_resolution: ConflictResolution,
    pub stage: SyncStage,
}

#[derive(Debug, Clone)]
pub struct SyncRepository {
    db: DatabaseConnection,
}

impl SyncRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewSync) -> Result<sync::Model> {
        let now = Utc::now().fixed_offset();

        Ok(sync::ActiveModel {
            id: Set(Uuid::new_v4()),
            team_id: Set(new.team_id),
            name: Set(new.name),
            source_connection_id: Set(new.source_connection_id),
            destination_connection_id: Set(new.destination_connection_id),
            source_table_id: Set(new.source_table_id),
            destination_table_id: Set(new.destination_table_id),
            table_mappings: Set(Some(serde_json::to_value(TableMappings::default())?)),
            schedule: Set(new.schedule),
            conflict_resolution: Set(new.conflict_resolution.as_str().to_string()),
            stage: Set(new.stage.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<sync::Model>> {
        Ok(Syncs::find_by_id(id).one(&self.db).await?)
    }

    /// Syncs reading from or writing to any of `table_ids`
    pub async fn find_by_table_ids(&self, table_ids: &[Uuid]) -> Result<Vec<sync::Model>> {
        if table_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(Syncs::find()
            .filter(
                Condition::any()
                    .add(sync::Column::SourceTableId.is_in(table_ids.iter().copied()))
                    .add(sync::Column::DestinationTableId.is_in(table_ids.iter().copied())),
            )
            .order_by_asc(sync::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Store new mappings and move the stage forward to at least `minimum_stage`
    pub async fn update_mappings(
        &self,
        id: Uuid,
        mappings: &TableMappings,
        minimum_stage: SyncStage,
    ) -> Result<sync::Model> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("Sync with ID '{}' not found", id))?;

        let stage = match existing.stage() {
            Some(current) if current >= minimum_stage => current,
            _ => minimum_stage,
        };

        let mut active: sync::ActiveModel = existing.into();
        active.table_mappings = Set(Some(serde_json::to_value(mappings)?));
        active.stage = Set(stage.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }
}
