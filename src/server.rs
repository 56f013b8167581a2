//! # Server Configuration
//!
//! Application state wiring, router construction, and server startup for the
//! DM ingestion service.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AppConfig, INGEST_MODE_QUEUED};
use crate::enrichment::{Enricher, GraphProfileResolver, ProfileCache, ProfileResolver};
use crate::handlers;
use crate::pipeline::{self, DeliveryJob, EventPipeline};
use crate::repositories::MessageRepository;
use crate::resolver::TenantResolver;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<EventPipeline>,
    /// Queue handle for the background ingest worker; `None` in inline mode
    pub ingest_tx: Option<mpsc::Sender<DeliveryJob>>,
}

/// Builds the application state, wiring the pipeline components together and
/// spawning the ingest worker when the configuration calls for queued mode.
pub fn build_state(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    shutdown: CancellationToken,
) -> AppState {
    let shared_db = Arc::new(db.clone());

    let resolver = TenantResolver::new(
        shared_db.clone(),
        Duration::from_millis(config.resolver_timeout_ms),
    );

    let profile_resolver: Option<Arc<dyn ProfileResolver>> =
        config.profile_api_token.as_ref().map(|token| {
            Arc::new(GraphProfileResolver::new(
                config.profile_api_base.clone(),
                token.clone(),
            )) as Arc<dyn ProfileResolver>
        });

    // One cache per process, passed by reference into the enricher.
    let profile_cache = Arc::new(ProfileCache::new(
        config.profile_cache_capacity,
        Duration::from_secs(config.profile_cache_ttl_seconds),
    ));

    let enricher = Enricher::new(
        profile_resolver,
        profile_cache,
        MessageRepository::new(shared_db.clone()),
        Duration::from_millis(config.enrichment_timeout_ms),
    );

    let event_pipeline = Arc::new(EventPipeline::new(shared_db, resolver, enricher));

    let ingest_tx = if config.ingest_mode == INGEST_MODE_QUEUED {
        Some(pipeline::spawn_worker(
            event_pipeline.clone(),
            config.ingest_queue_depth,
            shutdown,
        ))
    } else {
        None
    };

    AppState {
        db,
        config,
        pipeline: event_pipeline,
        ingest_tx,
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/instagram",
            get(handlers::webhooks::verify_subscription).post(handlers::webhooks::receive_delivery),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let state = build_state(config.clone(), db, shutdown.clone());
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, profile = %config.profile, ingest_mode = %config.ingest_mode, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhooks::verify_subscription,
        crate::handlers::webhooks::receive_delivery,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::webhooks::DeliveryAck,
            crate::error::ApiError,
        )
    ),
    info(
        title = "DM Ingest API",
        description = "Multi-tenant webhook receiver for inbound direct messages",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
