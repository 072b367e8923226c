//! Test utilities for database testing.
//!
//! In-memory SQLite with every migration applied, the connector catalog seeded and foreign
//! keys enforced, plus fixture helpers that go through the repositories.

#![allow(dead_code)]

use anyhow::Result;
use sea_orm::DatabaseConnection;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use syncflow::config::AppConfig;
use syncflow::crypto::CryptoKey;
use syncflow::db::{init_pool, run_migrations};
use syncflow::models::{connection, connection_table, sync};
use syncflow::providers::{DiscoveredColumn, DiscoveredDatabase, DiscoveredTable, Provider};
use syncflow::repositories::{
    ConnectionRepository, NewConnection, NewSync, SchemaRepository, SyncRepository,
};
use syncflow::seeds::seed_connectors;
use syncflow::server::AppState;

pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        ..AppConfig::default()
    };
    let db = init_pool(&config).await?;
    run_migrations(&db).await?;
    seed_connectors(&db).await?;
    Ok(db)
}

pub fn test_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("valid test key")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        ..AppConfig::default()
    }
}

pub fn test_state(db: DatabaseConnection, config: AppConfig) -> AppState {
    AppState::new(config, db).expect("test state builds")
}

pub fn connections(db: &DatabaseConnection) -> ConnectionRepository {
    ConnectionRepository::new(db.clone(), test_key())
}

pub async fn insert_connection(
    db: &DatabaseConnection,
    provider: Provider,
    credentials: JsonValue,
) -> Result<connection::Model> {
    connections(db)
        .create(NewConnection {
            team_id: Uuid::new_v4(),
            provider,
            name: format!("{} test", provider.display_name()),
            credentials,
            config: None,
            expires_at: None,
        })
        .await
}

/// One database with one table holding `columns`
pub async fn insert_table(
    db: &DatabaseConnection,
    connection_id: Uuid,
    database_external_id: &str,
    table_external_id: &str,
    table_name: &str,
    columns: &[&str],
) -> Result<connection_table::Model> {
    let schema = SchemaRepository::new(db.clone());
    let database = schema
        .upsert_database(
            connection_id,
            &DiscoveredDatabase::new(database_external_id, database_external_id),
        )
        .await?;
    let discovered = DiscoveredTable::new(table_external_id, table_name).with_columns(
        columns
            .iter()
            .enumerate()
            .map(|(i, name)| DiscoveredColumn::new(*name, "text", i as i32 + 1))
            .collect(),
    );
    let table = schema
        .upsert_table(connection_id, database.id, &discovered)
        .await?;
    Ok(table.table)
}

pub async fn insert_sync(
    db: &DatabaseConnection,
    source: (&connection::Model, &connection_table::Model),
    destination: (&connection::Model, &connection_table::Model),
    stage: sync::SyncStage,
) -> Result<sync::Model> {
    SyncRepository::new(db.clone())
        .create(NewSync {
            team_id: source.0.team_id,
            name: format!("{} → {}", source.1.name, destination.1.name),
            source_connection_id: Some(source.0.id),
            destination_connection_id: Some(destination.0.id),
            source_table_id: Some(source.1.id),
            destination_table_id: Some(destination.1.id),
            schedule: None,
            conflict_resolution: sync::ConflictResolution::SourceWins,
            stage,
        })
        .await
}

pub fn airtable_credentials() -> JsonValue {
    json!({ "api_key": "pat123" })
}
