//! # Job Repositories
//!
//! Queue access for `metadata_sync_jobs` and `data_sync_jobs`. Both tables follow the same
//! lifecycle and share the optimistic claim: a status change only applies when the row still
//! holds the status the caller last saw.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::{JobStatus, JobTrigger, data_sync_job, metadata_sync_job};

/// Contract shared by both job queues
#[async_trait]
pub trait JobStore: Send + Sync {
    type Job: Send + Sync;
    type NewJob: Send;

    /// Oldest job still waiting to be claimed
    async fn get_pending_job(&self) -> Result<Option<Self::Job>>;

    /// Move `id` to `new_status` if it is still in `expected`.
    ///
    /// Returns `Ok(false)` when the row was already moved by someone else.
    async fn update_job_status(
        &self,
        id: Uuid,
        new_status: JobStatus,
        expected: JobStatus,
    ) -> Result<bool>;

    /// Insert a pending job
    async fn create_job(&self, job: Self::NewJob) -> Result<Self::Job>;

    /// Mark a processing job completed
    async fn complete_job(&self, id: Uuid) -> Result<bool>;

    /// Mark a processing job failed with a reason
    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool>;
}

/// Request to rediscover one connection's schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMetadataSyncJob {
    pub connection_id: Uuid,
}

/// Request to run one sync
#[derive(Debug, Clone, PartialEq)]
pub struct NewDataSyncJob {
    pub sync_id: Uuid,
    pub trigger: JobTrigger,
    pub payload: Option<JsonValue>,
}

/// Columns every job table carries
trait JobTable: EntityTrait {
    const ID: Self::Column;
    const STATUS: Self::Column;
    const MESSAGE: Self::Column;
    const STARTED_AT: Self::Column;
    const FINISHED_AT: Self::Column;
    const CREATED_AT: Self::Column;
    const UPDATED_AT: Self::Column;
}

impl JobTable for metadata_sync_job::Entity {
    const ID: Self::Column = metadata_sync_job::Column::Id;
    const STATUS: Self::Column = metadata_sync_job::Column::Status;
    const MESSAGE: Self::Column = metadata_sync_job::Column::Message;
    const STARTED_AT: Self::Column = metadata_sync_job::Column::StartedAt;
    const FINISHED_AT: Self::Column = metadata_sync_job::Column::FinishedAt;
    const CREATED_AT: Self::Column = metadata_sync_job::Column::CreatedAt;
    const UPDATED_AT: Self::Column = metadata_sync_job::Column::UpdatedAt;
}

impl JobTable for data_sync_job::Entity {
    const ID: Self::Column = data_sync_job::Column::Id;
    const STATUS: Self::Column = data_sync_job::Column::Status;
    const MESSAGE: Self::Column = data_sync_job::Column::Message;
    const STARTED_AT: Self::Column = data_sync_job::Column::StartedAt;
    const FINISHED_AT: Self::Column = data_sync_job::Column::FinishedAt;
    const CREATED_AT: Self::Column = data_sync_job::Column::CreatedAt;
    const UPDATED_AT: Self::Column = data_sync_job::Column::UpdatedAt;
}

async fn oldest_pending<E: JobTable>(db: &DatabaseConnection) -> Result<Option<E::Model>> {
    Ok(E::find()
        .filter(E::STATUS.eq(JobStatus::Pending.as_str()))
        .order_by_asc(E::CREATED_AT)
        .one(db)
        .await?)
}

/// Conditional status update; `false` when the row is no longer in `expected`
async fn transition<E: JobTable>(
    db: &DatabaseConnection,
    id: Uuid,
    new_status: JobStatus,
    expected: JobStatus,
    message: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().fixed_offset();
    let mut update = E::update_many()
        .col_expr(E::STATUS, Expr::value(new_status.as_str()))
        .col_expr(E::UPDATED_AT, Expr::value(now));

    match new_status {
        JobStatus::Processing => {
            update = update.col_expr(E::STARTED_AT, Expr::value(Some(now)));
        }
        JobStatus::Completed | JobStatus::Failed => {
            update = update
                .col_expr(E::FINISHED_AT, Expr::value(Some(now)))
                .col_expr(E::MESSAGE, Expr::value(message.map(str::to_string)));
        }
        JobStatus::Pending => {}
    }

    let result = update
        .filter(E::ID.eq(id))
        .filter(E::STATUS.eq(expected.as_str()))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

#[derive(Debug, Clone)]
pub struct MetadataSyncJobRepository {
    db: DatabaseConnection,
}

impl MetadataSyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<metadata_sync_job::Model>> {
        Ok(metadata_sync_job::Entity::find_by_id(id).one(&self.db).await?)
    }
}

#[async_trait]
impl JobStore for MetadataSyncJobRepository {
    type Job = metadata_sync_job::Model;
    type NewJob = NewMetadataSyncJob;

    async fn get_pending_job(&self) -> Result<Option<Self::Job>> {
        oldest_pending::<metadata_sync_job::Entity>(&self.db).await
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        new_status: JobStatus,
        expected: JobStatus,
    ) -> Result<bool> {
        transition::<metadata_sync_job::Entity>(&self.db, id, new_status, expected, None).await
    }

    async fn create_job(&self, job: Self::NewJob) -> Result<Self::Job> {
        let now = Utc::now().fixed_offset();
        let model = metadata_sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(job.connection_id),
            status: Set(JobStatus::Pending.as_str().to_string()),
            message: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            job_id = %model.id,
            connection_id = %model.connection_id,
            "Metadata sync job enqueued"
        );
        Ok(model)
    }

    async fn complete_job(&self, id: Uuid) -> Result<bool> {
        transition::<metadata_sync_job::Entity>(
            &self.db,
            id,
            JobStatus::Completed,
            JobStatus::Processing,
            None,
        )
        .await
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        transition::<metadata_sync_job::Entity>(
            &self.db,
            id,
            JobStatus::Failed,
            JobStatus::Processing,
            Some(message),
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct DataSyncJobRepository {
    db: DatabaseConnection,
}

impl DataSyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<data_sync_job::Model>> {
        Ok(data_sync_job::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn list_by_sync(&self, sync_id: Uuid) -> Result<Vec<data_sync_job::Model>> {
        use data_sync_job::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::SyncId.eq(sync_id))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?)
    }
}

#[async_trait]
impl JobStore for DataSyncJobRepository {
    type Job = data_sync_job::Model;
    type NewJob = NewDataSyncJob;

    async fn get_pending_job(&self) -> Result<Option<Self::Job>> {
        oldest_pending::<data_sync_job::Entity>(&self.db).await
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        new_status: JobStatus,
        expected: JobStatus,
    ) -> Result<bool> {
        transition::<data_sync_job::Entity>(&self.db, id, new_status, expected, None).await
    }

    async fn create_job(&self, job: Self::NewJob) -> Result<Self::Job> {
        let now = Utc::now().fixed_offset();
        let model = data_sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            sync_id: Set(job.sync_id),
            status: Set(JobStatus::Pending.as_str().to_string()),
            trigger: Set(job.trigger.as_str().to_string()),
            payload: Set(job.payload),
            message: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            job_id = %model.id,
            sync_id = %model.sync_id,
            trigger = %model.trigger,
            "Data sync job enqueued"
        );
        Ok(model)
    }

    async fn complete_job(&self, id: Uuid) -> Result<bool> {
        transition::<data_sync_job::Entity>(
            &self.db,
            id,
            JobStatus::Completed,
            JobStatus::Processing,
            None,
        )
        .await
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        transition::<data_sync_job::Entity>(
            &self.db,
            id,
            JobStatus::Failed,
            JobStatus::Processing,
            Some(message),
        )
        .await
    }
}
