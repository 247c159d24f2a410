//! Recipe Suggest HTTP Gateway
//!
//! The entry point for recipe suggestion requests.
//! Handles:
//! - Recipe generation from stock or without constraints
//! - Judging which recipe ingredients are missing from stock
//! - Kicking off detached blog publishing
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use recipe_suggest_common::{
    cms::{create_publisher, BlogPublisher},
    config::AppConfig,
    errors::Result,
    extract::StructuredExtractor,
    generative::{create_generator, TextGenerator},
    metrics,
    models::PostStatus,
    publish::PublishCoordinator,
    reconcile::IngredientReconciler,
    store::{create_document_store, DocumentStore},
    tasks::{TaskSubmitter, TokioTaskSubmitter},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generator: Arc<dyn TextGenerator>,
    pub extractor: StructuredExtractor,
    pub reconciler: Arc<IngredientReconciler>,
    pub publisher: Arc<PublishCoordinator>,
    pub tasks: Arc<dyn TaskSubmitter>,
}

impl AppState {
    /// Wire the collaborators together
    pub fn new(
        config: Arc<AppConfig>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn DocumentStore>,
        cms: Option<Arc<dyn BlogPublisher>>,
        tasks: Arc<dyn TaskSubmitter>,
    ) -> Result<Self> {
        let extractor = StructuredExtractor::new(config.limits.error_preview_chars);
        let reconciler = Arc::new(IngredientReconciler::new(&config.matching)?);
        let publisher = Arc::new(PublishCoordinator::new(
            generator.clone(),
            extractor,
            store,
            cms,
            config.document_store.blog_posts_collection.clone(),
            PostStatus::from_config(&config.cms.post_status),
            config.generative.blog_timeout(),
        ));

        Ok(Self {
            config,
            generator,
            extractor,
            reconciler,
            publisher,
            tasks,
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting Recipe Suggest Gateway v{}", recipe_suggest_common::VERSION);

    // Initialize metrics
    metrics::install_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    let config = Arc::new(config);

    // Initialize collaborators
    let generator = create_generator(&config.generative)?;
    let store = create_document_store(&config.document_store)?;
    let cms = create_publisher(&config.cms)?;
    info!(
        generator = generator.model_name(),
        store = %config.document_store.provider,
        cms_enabled = cms.is_some(),
        "Collaborators initialized"
    );

    let state = AppState::new(
        config.clone(),
        generator,
        store,
        cms,
        Arc::new(TokioTaskSubmitter),
    )?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = middleware::cors::cors_layer(&state.config.server.api_key_header);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        // Recipe endpoint, served at the root and under a named path
        .route(
            "/",
            post(handlers::recipes::suggest).options(middleware::cors::preflight),
        )
        .route(
            "/recipes",
            post(handlers::recipes::suggest).options(middleware::cors::preflight),
        )
        // Health endpoint
        .route("/health", get(handlers::health::health))
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
