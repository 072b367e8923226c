//! # Server Configuration
//!
//! Shared application state, the axum router and the HTTP server entry point.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::connection_resolver::ConnectionResolver;
use crate::crypto::CryptoKey;
use crate::discovery::MetadataDiscovery;
use crate::handlers;
use crate::jobs::{DataSyncHandler, JobWorker, MetadataSyncHandler};
use crate::listeners::ListenerService;
use crate::providers::{ConfigFactory, StrategyRegistry};
use crate::repositories::{
    ConnectionRepository, DataSyncJobRepository, MetadataSyncJobRepository, SchemaRepository,
    SyncRepository,
};
use crate::telemetry::trace_context_middleware;
use crate::token_refresh::TokenRefresher;
use crate::webhooks::WebhookService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub http: reqwest::Client,
    pub registry: StrategyRegistry,
}

impl AppState {
    /// Builds state with the default strategy for every provider
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Result<Self> {
        let crypto_key = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow!("SYNCFLOW_CRYPTO_KEY is required"))
            .and_then(|bytes| CryptoKey::new(bytes).map_err(anyhow::Error::from))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("syncflow/", env!("CARGO_PKG_VERSION")))
            .timeout(config.worker.discovery_timeout())
            .build()
            .context("Failed to build HTTP client")?;
        let registry = StrategyRegistry::with_defaults(http.clone());

        Ok(Self {
            config: Arc::new(config),
            db,
            crypto_key,
            http,
            registry,
        })
    }

    pub fn connections(&self) -> ConnectionRepository {
        ConnectionRepository::new(self.db.clone(), self.crypto_key.clone())
    }

    pub fn schema(&self) -> SchemaRepository {
        SchemaRepository::new(self.db.clone())
    }

    pub fn syncs(&self) -> SyncRepository {
        SyncRepository::new(self.db.clone())
    }

    pub fn metadata_jobs(&self) -> MetadataSyncJobRepository {
        MetadataSyncJobRepository::new(self.db.clone())
    }

    pub fn data_jobs(&self) -> DataSyncJobRepository {
        DataSyncJobRepository::new(self.db.clone())
    }

    pub fn config_factory(&self) -> ConfigFactory {
        ConfigFactory::new(self.config.endpoints.clone())
    }

    pub fn resolver(&self) -> ConnectionResolver {
        let refresher = TokenRefresher::new(
            self.http.clone(),
            self.connections(),
            self.config.oauth.clone(),
            self.config.endpoints.clone(),
            self.config.worker.token_refresh_lead_time_seconds,
        );
        ConnectionResolver::new(self.connections(), refresher, self.config_factory())
    }

    pub fn discovery(&self) -> MetadataDiscovery {
        MetadataDiscovery::new(
            self.schema(),
            self.registry.clone(),
            self.config.worker.discovery_timeout(),
        )
    }

    pub fn metadata_handler(&self) -> MetadataSyncHandler<MetadataSyncJobRepository> {
        MetadataSyncHandler::new(self.metadata_jobs(), self.resolver(), self.discovery())
    }

    pub fn data_handler(&self) -> DataSyncHandler<DataSyncJobRepository> {
        DataSyncHandler::new(self.data_jobs(), self.syncs(), self.resolver())
    }

    pub fn worker(&self) -> JobWorker<MetadataSyncJobRepository, DataSyncJobRepository> {
        JobWorker::new(
            self.metadata_handler(),
            self.data_handler(),
            self.config.worker.tick_interval(),
        )
    }

    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(self.connections(), self.schema(), self.syncs())
    }

    pub fn listeners(&self) -> ListenerService {
        ListenerService::new(
            self.http.clone(),
            self.registry.clone(),
            self.config_factory(),
            self.config.public_base_url.clone(),
        )
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs/metadata/process", post(handlers::jobs::process_metadata_jobs))
        .route("/jobs/data/process", post(handlers::jobs::process_data_jobs))
        .route("/listeners", post(handlers::listeners::setup_listener))
        .route("/edge/discover", post(handlers::edge::discover))
        .route("/edge/validate-connection", post(handlers::edge::validate_connection))
        .route("/connections", post(handlers::connections::create_connection))
        .route("/connections/{id}/schema", get(handlers::connections::get_schema))
        .route(
            "/connections/{id}/metadata-sync",
            post(handlers::connections::enqueue_metadata_sync),
        )
        .route("/syncs/{id}/auto-map", post(handlers::syncs::auto_map))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks", post(handlers::webhooks::receive_webhook))
        .route(
            "/webhooks/{provider}",
            post(handlers::webhooks::receive_provider_webhook),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(CorsLayer::permissive())
}

/// Starts the server and serves until CTRL-C
pub async fn run_server(state: AppState) -> Result<()> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| anyhow!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::jobs::process_metadata_jobs,
        crate::handlers::jobs::process_data_jobs,
        crate::handlers::webhooks::receive_webhook,
        crate::handlers::webhooks::receive_provider_webhook,
        crate::handlers::listeners::setup_listener,
        crate::handlers::edge::discover,
        crate::handlers::edge::validate_connection,
        crate::handlers::connections::create_connection,
        crate::handlers::connections::get_schema,
        crate::handlers::connections::enqueue_metadata_sync,
        crate::handlers::syncs::auto_map,
    ),
    components(
        schemas(
            crate::models::HealthStatus,
            crate::error::ApiError,
            crate::jobs::JobOutcome,
            crate::providers::Provider,
            crate::listeners::ListenerRegistration,
            crate::models::sync::FieldMapping,
            crate::handlers::webhooks::WebhookResponse,
            crate::handlers::listeners::SetupListenerRequest,
            crate::handlers::edge::DiscoverRequest,
            crate::handlers::edge::ValidateConnectionRequest,
            crate::handlers::edge::ValidateConnectionResponse,
            crate::handlers::types::SchemaResponse,
            crate::handlers::types::DatabaseInfo,
            crate::handlers::types::TableInfo,
            crate::handlers::types::ColumnInfo,
            crate::handlers::connections::CreateConnectionRequest,
            crate::handlers::connections::CreateConnectionResponse,
            crate::handlers::connections::EnqueuedJobResponse,
            crate::handlers::syncs::AutoMapRequest,
            crate::handlers::syncs::AutoMapResponse,
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "health", description = "Liveness"),
        (name = "jobs", description = "Scheduled job triggers"),
        (name = "webhooks", description = "Inbound provider notifications"),
        (name = "listeners", description = "Provider change-notification setup"),
        (name = "edge", description = "Schema discovery and connection checks"),
        (name = "connections", description = "Connections and their schema"),
        (name = "syncs", description = "Sync configuration"),
    ),
    info(
        title = "Syncflow API",
        description = "Metadata discovery and job processing for Syncflow",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
