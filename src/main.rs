mod circuit_breaker;
mod config;
mod db;
mod documents;
mod endorsements;
mod errors;
mod handlers;
mod models;
mod normalize;
mod providers;
mod submission;
mod webhook_handler;
mod webhook_models;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::documents::HttpDocumentSource;
use crate::endorsements::PgEndorsementStore;
use crate::providers::build_registry;
use crate::submission::{RetryPolicy, SubmissionOrchestrator};

/// Main entry point for the submission orchestration service.
///
/// Initialization order:
/// - Logging and tracing.
/// - Configuration (provider credentials, retry knobs).
/// - Database connection (endorsement store).
/// - Shared HTTP client, document source, provider adapters.
/// - HTTP routes and middleware (CORS, rate limiting, body limit).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_kyb_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let store = Arc::new(PgEndorsementStore::new(db.pool.clone()));

    // One shared HTTP client for every provider adapter; base URLs and
    // credentials stay per-adapter.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let document_source = Arc::new(HttpDocumentSource::new(client.clone()));

    let registry = Arc::new(build_registry(
        &config,
        client,
        document_source.clone(),
    ));
    tracing::info!(
        "Provider adapters configured: {:?}",
        registry.configured()
    );

    let orchestrator = Arc::new(SubmissionOrchestrator::new(
        registry,
        store.clone(),
        document_source,
        RetryPolicy::from_settings(&config.retry),
    ));

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        config: config.clone(),
        store,
        orchestrator,
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
        // Submission orchestration
        .route("/api/v1/submissions", post(handlers::submit_profile))
        // Endorsement status (customer-facing state)
        .route(
            "/api/v1/endorsements/:customer_id",
            get(handlers::list_endorsements),
        )
        .route(
            "/api/v1/endorsements/:customer_id/:provider",
            get(handlers::get_endorsement),
        )
        // Out-of-band provider status updates
        .route(
            "/api/v1/webhooks/provider-status",
            post(webhook_handler::provider_status_webhook),
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
