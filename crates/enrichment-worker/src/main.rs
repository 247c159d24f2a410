//! Recipe Suggest Enrichment Worker
//!
//! Receives document-creation events over HTTP:
//! 1. Decodes the CloudEvent and the created document's fields
//! 2. Generates reading, synonyms and images for the document
//! 3. Writes the results back onto the same document
//!
//! Every event is acknowledged once handled; failures are recorded on the
//! document or logged, never retried.

mod event;
mod processor;

use crate::event::DocumentEvent;
use crate::processor::{EnrichmentOutcome, IngredientEnricher, RecipeImageEnricher};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use recipe_suggest_common::{
    config::AppConfig,
    errors::Result,
    extract::StructuredExtractor,
    generative::{create_generator, TextGenerator},
    images::{create_image_generator, ImageGenerator},
    metrics,
    store::{create_document_store, DocumentStore},
    VERSION,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Shared worker state
#[derive(Clone)]
pub struct WorkerState {
    pub ingredients: Arc<IngredientEnricher>,
    pub recipes: Arc<RecipeImageEnricher>,
    pub ingredients_collection: String,
    pub recipes_collection: String,
}

impl WorkerState {
    pub fn new(
        config: &AppConfig,
        generator: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let extractor = StructuredExtractor::new(config.limits.error_preview_chars);
        Self {
            ingredients: Arc::new(IngredientEnricher::new(
                generator,
                extractor,
                images.clone(),
                store.clone(),
                config.generative.enrichment_timeout(),
            )),
            recipes: Arc::new(RecipeImageEnricher::new(images, store)),
            ingredients_collection: config.document_store.ingredients_collection.clone(),
            recipes_collection: config.document_store.recipes_collection.clone(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
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
    info!("Starting Recipe Suggest Enrichment Worker v{}", VERSION);

    metrics::install_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    // Initialize collaborators
    let generator = create_generator(&config.generative)?;
    let images = create_image_generator(&config.images)?;
    let store = create_document_store(&config.document_store)?;
    info!(
        generator = generator.model_name(),
        images = %config.images.provider,
        store = %config.document_store.provider,
        "Collaborators initialized"
    );

    let app = create_router(WorkerState::new(&config, generator, images, store));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;

    info!("Enrichment worker shutting down");
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

/// Create the event router
pub fn create_router(state: WorkerState) -> Router {
    Router::new()
        .route("/", post(dispatch_event))
        .route("/events/ingredients", post(ingredient_event))
        .route("/events/recipes", post(recipe_event))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: VERSION,
    })
}

fn decode(headers: &HeaderMap, body: &[u8]) -> Result<DocumentEvent> {
    let event = DocumentEvent::decode(headers, body)?;
    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        document = ?event.document_name,
        "Received document event"
    );
    Ok(event)
}

async fn ingredient_event(
    State(state): State<WorkerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EnrichmentOutcome>> {
    let event = decode(&headers, &body)?;
    Ok(Json(state.ingredients.process(&event).await))
}

async fn recipe_event(
    State(state): State<WorkerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EnrichmentOutcome>> {
    let event = decode(&headers, &body)?;
    Ok(Json(state.recipes.process(&event).await))
}

/// Route by the collection of the created document
async fn dispatch_event(
    State(state): State<WorkerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EnrichmentOutcome>> {
    let event = decode(&headers, &body)?;

    let collection = event
        .document()
        .and_then(|doc| doc.path.rsplit('/').nth(1).map(str::to_string));

    let outcome = match collection.as_deref() {
        Some(c) if c == state.ingredients_collection => state.ingredients.process(&event).await,
        Some(c) if c == state.recipes_collection => state.recipes.process(&event).await,
        other => {
            warn!(collection = ?other, "Event for an unwatched collection");
            EnrichmentOutcome::Skipped {
                reason: "unwatched collection".to_string(),
            }
        }
    };
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use recipe_suggest_common::{
        generative::MockGenerator, images::StaticImageGenerator, store::InMemoryDocumentStore,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(store: Arc<InMemoryDocumentStore>) -> Router {
        let generator = MockGenerator::new().with_response(
            "カナ表記",
            r#"{"kana": "たまご", "synonyms": ["玉子"], "image_prompt": "an egg"}"#,
        );
        create_router(WorkerState::new(
            &AppConfig::default(),
            Arc::new(generator),
            Arc::new(StaticImageGenerator::new("https://cdn.test")),
            store,
        ))
    }

    fn cloud_event(name: &str, fields: Value) -> Request<Body> {
        let body = json!({
            "specversion": "1.0",
            "id": "evt-1",
            "type": "google.cloud.firestore.document.v1.created",
            "data": { "value": { "name": name, "fields": fields } }
        });
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/cloudevents+json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_ingredient_event() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/e1", serde_json::Map::new());

        let (status, body) = send(
            app(store.clone()),
            cloud_event(
                "projects/p/databases/(default)/documents/ingredients_master/e1",
                json!({ "name": { "stringValue": "卵" } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "updated");
        let doc = store.document("ingredients_master/e1").unwrap();
        assert_eq!(doc["kana"], "たまご");
        assert_eq!(doc["imageUrl"], "https://cdn.test/ingredients/e1.png");
    }

    #[tokio::test]
    async fn test_dispatch_recipe_event() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("recipes/r1", serde_json::Map::new());

        let (status, body) = send(
            app(store.clone()),
            cloud_event(
                "projects/p/databases/(default)/documents/recipes/r1",
                json!({
                    "title": { "stringValue": "卵焼き" },
                    "steps": { "arrayValue": { "values": [{ "stringValue": "焼く" }] } }
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "updated");
        let doc = store.document("recipes/r1").unwrap();
        assert_eq!(doc["stepImageUrls"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vanished_document_acknowledged() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (status, body) = send(
            app(store.clone()),
            cloud_event(
                "projects/p/databases/(default)/documents/ingredients_master/gone",
                json!({ "name": { "stringValue": "卵" } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "vanished");
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_unwatched_collection_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let (status, body) = send(
            app(store),
            cloud_event("users/u1", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "skipped");
    }

    #[tokio::test]
    async fn test_undecodable_event_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/events/ingredients")
            .body(Body::from("not an event"))
            .unwrap();
        let (status, body) = send(app(Arc::new(InMemoryDocumentStore::new())), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("error").is_some());
    }
}
