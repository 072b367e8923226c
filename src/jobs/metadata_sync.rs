//! Metadata sync handler
//!
//! claim → resolve connection → discover sources, tables and columns → complete.
//! Any failure marks the job failed and rolls back the connection's discovered schema.

use anyhow::Result;
use metrics::{counter, histogram};
use tracing::{error, info, instrument};

use super::JobOutcome;
use crate::connection_resolver::ConnectionResolver;
use crate::discovery::MetadataDiscovery;
use crate::models::{JobStatus, metadata_sync_job};
use crate::repositories::JobStore;

pub struct MetadataSyncHandler<S> {
    jobs: S,
    resolver: ConnectionResolver,
    discovery: MetadataDiscovery,
}

impl<S> MetadataSyncHandler<S>
where
    S: JobStore<Job = metadata_sync_job::Model>,
{
    pub fn new(jobs: S, resolver: ConnectionResolver, discovery: MetadataDiscovery) -> Self {
        Self {
            jobs,
            resolver,
            discovery,
        }
    }

    /// Process the oldest pending metadata sync job, if any
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
            info!(job_id = %job.id, "Metadata sync job already claimed");
            return Ok(JobOutcome::AlreadyClaimed { job_id: job.id });
        }
        counter!("sync_jobs_claimed_total", "queue" => "metadata").increment(1);

        let started = std::time::Instant::now();
        let result = async {
            let resolved = self.resolver.resolve(job.connection_id).await?;
            info!(
                job_id = %job.id,
                connection_id = %job.connection_id,
                provider = %resolved.provider,
                "Starting metadata discovery"
            );
            self.discovery
                .discover_all(job.connection_id, &resolved.config)
                .await?;
            anyhow::Ok(())
        }
        .await;
        histogram!("metadata_sync_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(()) => {
                self.jobs.complete_job(job.id).await?;
                counter!("sync_jobs_completed_total", "queue" => "metadata").increment(1);
                info!(job_id = %job.id, connection_id = %job.connection_id, "Metadata sync completed");
                Ok(JobOutcome::Completed { job_id: job.id })
            }
            Err(err) => {
                let message = err.to_string();
                error!(
                    job_id = %job.id,
                    connection_id = %job.connection_id,
                    error = %message,
                    "Metadata sync failed"
                );
                self.jobs.fail_job(job.id, &message).await?;
                self.discovery.rollback(job.connection_id).await?;
                counter!("sync_jobs_failed_total", "queue" => "metadata").increment(1);
                Ok(JobOutcome::Failed {
                    job_id: job.id,
                    message,
                })
            }
        }
    }
}
