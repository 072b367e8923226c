//! Job worker loop
//!
//! Runs both scheduled handlers on a fixed tick until shutdown is requested.

use std::time::Duration;

use metrics::histogram;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::{DataSyncHandler, JobOutcome, MetadataSyncHandler};
use crate::models::{data_sync_job, metadata_sync_job};
use crate::repositories::JobStore;

pub struct JobWorker<M, D> {
    metadata: MetadataSyncHandler<M>,
    data: DataSyncHandler<D>,
    tick_interval: Duration,
}

impl<M, D> JobWorker<M, D>
where
    M: JobStore<Job = metadata_sync_job::Model>,
    D: JobStore<Job = data_sync_job::Model>,
{
    pub fn new(
        metadata: MetadataSyncHandler<M>,
        data: DataSyncHandler<D>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            metadata,
            data,
            tick_interval,
        }
    }

    /// Run until `shutdown` fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.tick_interval.as_secs(),
            "Starting job worker"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job worker shutdown requested");
                    break;
                }
                _ = sleep(self.tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    self.tick().await;
                    histogram!("job_worker_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Job worker stopped");
    }

    /// One pass over both queues
    pub async fn tick(&self) -> (Option<JobOutcome>, Option<JobOutcome>) {
        let metadata = match self.metadata.process_next().await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(error = ?err, "Metadata job processing failed");
                None
            }
        };
        let data = match self.data.process_next().await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(error = ?err, "Data job processing failed");
                None
            }
        };

        debug!(
            metadata = metadata.as_ref().map(JobOutcome::label),
            data = data.as_ref().map(JobOutcome::label),
            "Job worker tick finished"
        );
        (metadata, data)
    }
}
