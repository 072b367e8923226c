//! # Syncflow Entry Point
//!
//! `serve` runs the HTTP API; the job subcommands are the scheduled triggers and process at
//! most one job each.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use syncflow::{
    config::{AppConfig, ConfigLoader},
    db::{health_check, init_pool, run_migrations},
    jobs::JobOutcome,
    seeds::seed_connectors,
    server::{AppState, run_server},
    telemetry::init_tracing,
};

#[derive(Parser)]
#[command(name = "syncflow")]
#[command(about = "Syncflow metadata discovery and job processing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Claim and process one pending metadata-sync job
    ProcessMetadataJobs,
    /// Claim and process one pending data-sync job
    ProcessDataJobs,
    /// Poll both job queues on a fixed tick until CTRL-C
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            let db = init_pool(&config).await?;
            run_migrations(&db).await
        }
        Commands::Serve => {
            let state = prepare(config).await?;
            run_server(state).await
        }
        Commands::ProcessMetadataJobs => {
            let state = prepare(config).await?;
            report(state.metadata_handler().process_next().await?)
        }
        Commands::ProcessDataJobs => {
            let state = prepare(config).await?;
            report(state.data_handler().process_next().await?)
        }
        Commands::Worker => {
            let state = prepare(config).await?;
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal.cancel();
                }
            });
            state.worker().run(shutdown).await;
            Ok(())
        }
    }
}

/// Migrated database and seeded catalog behind a ready [`AppState`]
async fn prepare(config: AppConfig) -> Result<AppState> {
    let db = init_pool(&config).await?;
    health_check(&db).await?;
    run_migrations(&db).await?;
    seed_connectors(&db).await?;
    AppState::new(config, db)
}

fn report(outcome: JobOutcome) -> Result<()> {
    tracing::info!(outcome = outcome.label(), "Job trigger finished");
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
