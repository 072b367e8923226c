//! Data sync handler
//!
//! claim → load the sync → check it is ready → resolve both connections → complete.
//! Record transfer between the two sides is not performed here; a job completes once the
//! sync is fully configured and both connections resolve with usable credentials.

use anyhow::{Result, anyhow, bail};
use metrics::counter;
use tracing::{error, info, instrument};

use super::JobOutcome;
use crate::connection_resolver::ConnectionResolver;
use crate::models::sync::SyncStage;
use crate::models::{JobStatus, data_sync_job};
use crate::repositories::{JobStore, SyncRepository};

pub struct DataSyncHandler<S> {
    jobs: S,
    syncs: SyncRepository,
    resolver: ConnectionResolver,
}

impl<S> DataSyncHandler<S>
where
    S: JobStore<Job = data_sync_job::Model>,
{
    pub fn new(jobs: S, syncs: SyncRepository, resolver: ConnectionResolver) -> Self {
        Self {
            jobs,
            syncs,
            resolver,
        }
    }

    async fn run(&self, job: &data_sync_job::Model) -> Result<()> {
        let sync = self
            .syncs
            .get_by_id(job.sync_id)
            .await?
            .ok_or_else(|| anyhow!("sync {} no longer exists", job.sync_id))?;

        match sync.stage() {
            Some(SyncStage::Ready) => {}
            Some(stage) => bail!("sync {} is not ready (stage '{}')", sync.id, stage),
            None => bail!("sync {} has an unknown stage '{}'", sync.id, sync.stage),
        }

        let (Some(source_id), Some(destination_id)) =
            (sync.source_connection_id, sync.destination_connection_id)
        else {
            bail!("sync {} is missing a source or destination connection", sync.id);
        };

        let source = self.resolver.resolve(source_id).await?;
        let destination = self.resolver.resolve(destination_id).await?;

        info!(
            job_id = %job.id,
            sync_id = %sync.id,
            trigger = %job.trigger,
            source = %source.provider,
            destination = %destination.provider,
            field_mappings = sync.mappings().field_mappings.len(),
            "Data sync prepared"
        );
        Ok(())
    }

    /// Process the oldest pending data sync job, if any
    #[instrument(skip_all)]
    pub async fn process_next(&self) -> Result<JobOutcome> {
        let Some(job) = self.jobs.get_pending_job().await? else {
            return Ok(JobOutcome::Idle);
        };

        if !self
            .jobs
            .update_job_status(job.id, JobStatus::Processing, JobStatus::Pending)
            .await?
        {
            info!(job_id = %job.id, "Data sync job already claimed");
            return Ok(JobOutcome::AlreadyClaimed { job_id: job.id });
        }
        counter!("sync_jobs_claimed_total", "queue" => "data").increment(1);

        match self.run(&job).await {
            Ok(()) => {
                self.jobs.complete_job(job.id).await?;
                counter!("sync_jobs_completed_total", "queue" => "data").increment(1);
                Ok(JobOutcome::Completed { job_id: job.id })
            }
            Err(err) => {
                let message = err.to_string();
                error!(job_id = %job.id, sync_id = %job.sync_id, error = %message, "Data sync failed");
                self.jobs.fail_job(job.id, &message).await?;
                counter!("sync_jobs_failed_total", "queue" => "data").increment(1);
                Ok(JobOutcome::Failed {
                    job_id: job.id,
                    message,
                })
            }
        }
    }
}
