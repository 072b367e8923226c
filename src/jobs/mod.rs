//! # Scheduled job handlers
//!
//! Each handler processes at most one job per invocation: claim the oldest pending row with a
//! conditional update, do the work, then mark it completed or failed. Losing the claim race is
//! not an error.

pub mod data_sync;
pub mod metadata_sync;
pub mod worker;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub use data_sync::DataSyncHandler;
pub use metadata_sync::MetadataSyncHandler;
pub use worker::JobWorker;

/// Result of one processing attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// No pending job
    Idle,
    /// Another worker claimed the job first
    AlreadyClaimed { job_id: Uuid },
    Completed { job_id: Uuid },
    Failed { job_id: Uuid, message: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Idle => "idle",
            JobOutcome::AlreadyClaimed { .. } => "already_claimed",
            JobOutcome::Completed { .. } => "completed",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_serializes_with_tag() {
        let id = Uuid::nil();
        assert_eq!(
            serde_json::to_value(JobOutcome::Idle).unwrap(),
            json!({ "outcome": "idle" })
        );
        assert_eq!(
            serde_json::to_value(JobOutcome::AlreadyClaimed { job_id: id }).unwrap(),
            json!({ "outcome": "already_claimed", "job_id": id })
        );
    }
}
