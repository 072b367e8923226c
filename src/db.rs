//! Database connection and pool management.
//!
//! Opens the SeaORM pool for the Syncflow store (Postgres in production, SQLite for tests and
//! local runs) and applies pending migrations. Every SQLite connection the pool opens has
//! foreign keys switched on; schema rollback relies on cascading deletes.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);
/// Closing the only `sqlite::memory:` connection drops the database with it
const NEVER_RECYCLE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database after {attempts} attempts: {source}")]
    ConnectionFailed {
        attempts: u32,
        #[source]
        source: sea_orm::DbErr,
    },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

fn is_in_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite:") && url.contains(":memory:")
}

fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug)
        .map_sqlx_sqlite_opts(|sqlite| sqlite.foreign_keys(true));

    if is_in_memory_sqlite(&cfg.database_url) {
        // Every connection to `sqlite::memory:` opens its own empty database
        opt.max_connections(1)
            .min_connections(1)
            .idle_timeout(NEVER_RECYCLE)
            .max_lifetime(NEVER_RECYCLE);
    } else {
        opt.max_connections(cfg.db_max_connections)
            .idle_timeout(IDLE_TIMEOUT)
            .max_lifetime(MAX_LIFETIME);
    }
    opt
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connection failures are retried with exponential backoff.
///
/// ```no_run
/// use syncflow::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.trim().is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    connect_with_retry(connect_options(cfg)).await
}

async fn connect_with_retry(opt: ConnectOptions) -> Result<DatabaseConnection> {
    let mut delay = INITIAL_RETRY_DELAY;
    let mut attempt = 1;

    loop {
        match Database::connect(opt.clone()).await {
            Ok(db) => {
                log::info!("Connected to database (attempt {})", attempt);
                return Ok(db);
            }
            Err(source) if attempt >= CONNECT_ATTEMPTS => {
                log::error!("Giving up on database after {} attempts: {}", attempt, source);
                return Err(DatabaseError::ConnectionFailed {
                    attempts: attempt,
                    source,
                }
                .into());
            }
            Err(e) => {
                log::warn!(
                    "Database connection attempt {} failed: {}, retrying in {:?}",
                    attempt,
                    e,
                    delay
                );
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Applies every pending migration.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .context("Failed to apply database migrations")?;
    log::info!("Database migrations are up to date");
    Ok(())
}

/// `SELECT 1` against the pool; fails when the database is unreachable.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("Database health check failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, TransactionTrait};

    async fn foreign_keys_enabled(conn: &impl ConnectionTrait) -> bool {
        let row = conn
            .query_one(Statement::from_string(
                DatabaseBackend::Sqlite,
                "PRAGMA foreign_keys".to_string(),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get_by_index::<i32>(0).unwrap() == 1
    }

    fn sqlite_memory_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..AppConfig::default()
        };

        let err = init_pool(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn in_memory_sqlite_is_detected() {
        assert!(is_in_memory_sqlite("sqlite::memory:"));
        assert!(is_in_memory_sqlite("sqlite://:memory:"));
        assert!(!is_in_memory_sqlite("sqlite://syncflow.db?mode=rwc"));
        assert!(!is_in_memory_sqlite("postgresql://localhost/syncflow"));
    }

    #[tokio::test]
    async fn sqlite_pool_enforces_foreign_keys() {
        let db = init_pool(&sqlite_memory_config()).await.unwrap();
        run_migrations(&db).await.unwrap();
        health_check(&db).await.unwrap();
        assert!(foreign_keys_enabled(&db).await);
    }

    #[test]
    fn in_memory_pool_keeps_its_single_connection() {
        let opt = connect_options(&sqlite_memory_config());
        assert_eq!(opt.get_max_connections(), Some(1));
        assert_eq!(opt.get_min_connections(), Some(1));
        assert_eq!(opt.get_idle_timeout(), Some(NEVER_RECYCLE));
        assert_eq!(opt.get_max_lifetime(), Some(NEVER_RECYCLE));

        let file = connect_options(&AppConfig {
            database_url: "sqlite://syncflow.db?mode=rwc".to_string(),
            db_max_connections: 4,
            ..AppConfig::default()
        });
        assert_eq!(file.get_max_connections(), Some(4));
        assert_eq!(file.get_idle_timeout(), Some(IDLE_TIMEOUT));
    }

    #[tokio::test]
    async fn every_pooled_sqlite_connection_enforces_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database_url: format!("sqlite://{}?mode=rwc", dir.path().join("sync.db").display()),
            db_max_connections: 4,
            ..AppConfig::default()
        };
        let db = init_pool(&config).await.unwrap();

        // Open transactions pin distinct connections
        let mut transactions = Vec::new();
        for _ in 0..3 {
            transactions.push(db.begin().await.unwrap());
        }
        for transaction in &transactions {
            assert!(foreign_keys_enabled(transaction).await);
        }
    }
}
