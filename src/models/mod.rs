//! # Data Models
//!
//! SeaORM entities for the Syncflow tables plus the small enums stored in their text columns.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod connection_column;
pub mod connection_database;
pub mod connection_table;
pub mod connector;
pub mod data_sync_job;
pub mod job_status;
pub mod metadata_sync_job;
pub mod sync;

pub use connection::Entity as Connection;
pub use connection_column::Entity as ConnectionColumn;
pub use connection_database::Entity as ConnectionDatabase;
pub use connection_table::Entity as ConnectionTable;
pub use connector::Entity as Connector;
pub use data_sync_job::Entity as DataSyncJob;
pub use job_status::{JobStatus, JobTrigger};
pub use metadata_sync_job::Entity as MetadataSyncJob;
pub use sync::Entity as Syncs;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// Always `ok` when the process is serving requests
    pub message: String,
    /// RFC 3339 timestamp of the check
    pub timestamp: String,
}
