//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the Syncflow tables.

pub mod connection;
pub mod connector;
pub mod jobs;
pub mod schema;
pub mod sync;

pub use connection::{ConnectionRepository, NewConnection};
pub use connector::ConnectorRepository;
pub use jobs::{
    DataSyncJobRepository, JobStore, MetadataSyncJobRepository, NewDataSyncJob,
    NewMetadataSyncJob,
};
pub use schema::{DatabaseSchema, SchemaRepository, TableSchema};
pub use sync::{NewSync, SyncRepository};
