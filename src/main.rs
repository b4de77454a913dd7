mod ai_disambiguator;
mod cache_validator;
mod circuit_breaker;
mod config;
mod db;
mod directory_lookup;
mod domain_prober;
mod domain_utils;
mod errors;
mod fusion;
mod handlers;
mod metrics;
mod models;
mod orchestrator;
mod places_lookup;
mod scoring;
mod search_lookup;
mod sources;
mod store;
mod verdict;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::fusion::FusionEngine;
use crate::orchestrator::{PipelineController, PipelineSettings};
use crate::sources::AdapterRegistry;
use crate::store::VerificationStore;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the adapter
/// registry and the pipeline controller, then starts the Axum server.
/// When `AUTO_RUNNER_ENABLED` is set the verification loop starts on
/// boot; otherwise it waits for a start request.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadscout=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Build the evidence-source registry; sources without credentials are
    // skipped with a warning, never an error.
    let registry = Arc::new(AdapterRegistry::from_config(&config));
    tracing::info!(sources = ?registry.available(), "evidence sources configured");

    let store = Arc::new(VerificationStore::new(db.pool.clone()));
    let controller = Arc::new(PipelineController::new(
        store,
        registry,
        FusionEngine::default(),
        PipelineSettings::default(),
    ));

    if config.auto_runner_enabled {
        controller.start(None).await;
        tracing::info!("auto-runner enabled; verification loop started");
    }

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        controller,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Pipeline control
        .route("/api/v1/pipeline/status", get(handlers::pipeline_status))
        .route("/api/v1/pipeline/start", post(handlers::pipeline_start))
        .route("/api/v1/pipeline/stop", post(handlers::pipeline_stop))
        .route("/api/v1/pipeline/run-once", post(handlers::pipeline_run_once))
        .route("/api/v1/pipeline/settings", put(handlers::update_settings))
        // Observability
        .route("/api/v1/metrics", get(handlers::get_metrics))
        // Per-business verification view
        .route(
            "/api/v1/businesses/:id/verification",
            get(handlers::business_verification),
        )
        .route(
            "/api/v1/businesses/:id/rescore",
            post(handlers::rescore_business),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
