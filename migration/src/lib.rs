//! Database migrations for the Syncflow backend.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000001_create_connectors;
mod m2026_01_05_000002_create_connections;
mod m2026_01_05_000003_create_connection_databases;
mod m2026_01_05_000004_create_connection_tables;
mod m2026_01_05_000005_create_connection_columns;
mod m2026_01_05_000006_create_syncs;
mod m2026_01_05_000007_create_sync_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000001_create_connectors::Migration),
            Box::new(m2026_01_05_000002_create_connections::Migration),
            Box::new(m2026_01_05_000003_create_connection_databases::Migration),
            Box::new(m2026_01_05_000004_create_connection_tables::Migration),
            Box::new(m2026_01_05_000005_create_connection_columns::Migration),
            Box::new(m2026_01_05_000006_create_syncs::Migration),
            Box::new(m2026_01_05_000007_create_sync_jobs::Migration),
        ]
    }
}
