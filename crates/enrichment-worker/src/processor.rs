//! Enrichment processors
//!
//! Two processors run on document creation:
//! - `IngredientEnricher`: reading, synonyms and an image for a new ingredient
//! - `RecipeImageEnricher`: a title image and one image per non-empty step
//!
//! Both write back onto the triggering document and nowhere else. A document
//! that disappeared before the write is a logged skip. Any other failure is
//! recorded on the document as `processing_error`, together with whatever
//! partial values were obtained, but only if the document still exists.

use crate::event::DocumentEvent;
use recipe_suggest_common::{
    errors::{AppError, Result},
    extract::StructuredExtractor,
    generative::TextGenerator,
    images::ImageGenerator,
    metrics::record_enrichment,
    models::IngredientProfile,
    prompt::PromptKind,
    store::{DocumentRef, DocumentStore, Fields},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Field holding the failure description
pub const PROCESSING_ERROR_FIELD: &str = "processing_error";

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    /// Enrichment fields written
    Updated,
    /// Nothing to do for this event
    Skipped { reason: String },
    /// Document was gone before the write
    Vanished,
    /// Enrichment failed; `annotated` tells whether `processing_error` was written
    Failed { error: String, annotated: bool },
}

impl EnrichmentOutcome {
    fn label(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Updated => "updated",
            EnrichmentOutcome::Skipped { .. } => "skipped",
            EnrichmentOutcome::Vanished => "vanished",
            EnrichmentOutcome::Failed { .. } => "failed",
        }
    }
}

/// Write `fields` onto an existing document
///
/// A document found missing, before or during the write, yields `Vanished`.
async fn write_back(
    store: &dyn DocumentStore,
    doc: &DocumentRef,
    fields: Fields,
) -> Result<EnrichmentOutcome> {
    if !store.exists(&doc.path).await? {
        let vanished = AppError::DocumentVanished {
            path: doc.path.clone(),
        };
        warn!(doc_id = %doc.id, error = %vanished, "Skipping write");
        return Ok(EnrichmentOutcome::Vanished);
    }

    match store.update(&doc.path, fields).await {
        Ok(()) => Ok(EnrichmentOutcome::Updated),
        Err(e @ AppError::DocumentVanished { .. }) => {
            warn!(doc_id = %doc.id, error = %e, "Skipping write");
            Ok(EnrichmentOutcome::Vanished)
        }
        Err(e) => Err(e),
    }
}

/// Record a failure on the document if it still exists; problems here are only logged
async fn annotate_failure(
    store: &dyn DocumentStore,
    doc: &DocumentRef,
    failure: &AppError,
    mut partial: Fields,
) -> EnrichmentOutcome {
    error!(doc_id = %doc.id, error = %failure, "Enrichment failed");

    let annotated = match store.exists(&doc.path).await {
        Ok(true) => {
            partial.insert(
                PROCESSING_ERROR_FIELD.to_string(),
                Value::String(failure.to_string()),
            );
            match store.update(&doc.path, partial).await {
                Ok(()) => true,
                Err(e) => {
                    error!(doc_id = %doc.id, error = %e, "Failed to record processing error");
                    false
                }
            }
        }
        Ok(false) => {
            warn!(doc_id = %doc.id, "Document vanished, processing error not recorded");
            false
        }
        Err(e) => {
            error!(doc_id = %doc.id, error = %e, "Failed to check document before recording error");
            false
        }
    };

    EnrichmentOutcome::Failed {
        error: failure.to_string(),
        annotated,
    }
}

/// Values obtained so far for an ingredient
#[derive(Debug, Default)]
struct IngredientFields {
    kana: String,
    synonyms: Vec<String>,
    image_url: String,
}

impl IngredientFields {
    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("kana".to_string(), Value::String(self.kana.clone()));
        fields.insert("synonyms".to_string(), json!(self.synonyms));
        fields.insert("imageUrl".to_string(), Value::String(self.image_url.clone()));
        fields
    }
}

/// Enriches new ingredient master entries
pub struct IngredientEnricher {
    generator: Arc<dyn TextGenerator>,
    extractor: StructuredExtractor,
    images: Arc<dyn ImageGenerator>,
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl IngredientEnricher {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        extractor: StructuredExtractor,
        images: Arc<dyn ImageGenerator>,
        store: Arc<dyn DocumentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            extractor,
            images,
            store,
            timeout,
        }
    }

    /// Handle one creation event; never fails
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn process(&self, event: &DocumentEvent) -> EnrichmentOutcome {
        let outcome = self.run(event).await;
        record_enrichment("ingredient", outcome.label());
        outcome
    }

    async fn run(&self, event: &DocumentEvent) -> EnrichmentOutcome {
        let Some(doc) = event.document() else {
            error!(name = ?event.document_name, "Cannot determine document from event");
            return EnrichmentOutcome::Skipped {
                reason: "unparseable document path".to_string(),
            };
        };

        let name = event.string_field("name");
        let category = event.string_field("category");
        info!(doc_id = %doc.id, name = %name, category = %category, "Enriching ingredient");

        if name.trim().is_empty() {
            warn!(doc_id = %doc.id, "Ingredient name is empty, skipping");
            return EnrichmentOutcome::Skipped {
                reason: "empty ingredient name".to_string(),
            };
        }

        let mut partial = IngredientFields::default();
        match self.enrich(&doc, &name, &category, &mut partial).await {
            Ok(outcome) => {
                info!(doc_id = %doc.id, outcome = outcome.label(), "Ingredient enrichment finished");
                outcome
            }
            Err(e) => annotate_failure(self.store.as_ref(), &doc, &e, partial.to_fields()).await,
        }
    }

    async fn enrich(
        &self,
        doc: &DocumentRef,
        name: &str,
        category: &str,
        partial: &mut IngredientFields,
    ) -> Result<EnrichmentOutcome> {
        let kind = PromptKind::IngredientEnrichment {
            name: name.to_string(),
            category: category.to_string(),
        };
        let text = self.generator.generate(&kind.build(), self.timeout).await?;
        let profile: IngredientProfile = self.extractor.extract_as(&text, kind.output_shape())?;

        partial.kana = profile.kana;
        partial.synonyms = profile.synonyms;

        if profile.image_prompt.trim().is_empty() {
            warn!(doc_id = %doc.id, name, "Image prompt is empty, no image generated");
        } else {
            let object_name = format!("ingredients/{}.png", doc.id);
            partial.image_url = self.images.generate(&profile.image_prompt, &object_name).await?;
        }

        // partial is reused by the failure annotation
        write_back(self.store.as_ref(), doc, partial.to_fields()).await
    }
}

/// Values obtained so far for a recipe
#[derive(Debug, Default)]
struct RecipeImageFields {
    title_image_url: String,
    step_image_urls: Vec<String>,
}

impl RecipeImageFields {
    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "titleImageUrl".to_string(),
            Value::String(self.title_image_url.clone()),
        );
        fields.insert("stepImageUrls".to_string(), json!(self.step_image_urls));
        fields
    }
}

/// Adds title and step images to new recipes
pub struct RecipeImageEnricher {
    images: Arc<dyn ImageGenerator>,
    store: Arc<dyn DocumentStore>,
}

impl RecipeImageEnricher {
    pub fn new(images: Arc<dyn ImageGenerator>, store: Arc<dyn DocumentStore>) -> Self {
        Self { images, store }
    }

    /// Handle one creation event; never fails
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn process(&self, event: &DocumentEvent) -> EnrichmentOutcome {
        let outcome = self.run(event).await;
        record_enrichment("recipe", outcome.label());
        outcome
    }

    async fn run(&self, event: &DocumentEvent) -> EnrichmentOutcome {
        let Some(doc) = event.document() else {
            error!(name = ?event.document_name, "Cannot determine document from event");
            return EnrichmentOutcome::Skipped {
                reason: "unparseable document path".to_string(),
            };
        };

        let title = event.string_field("title");
        let steps = event.string_list_field("steps");
        info!(doc_id = %doc.id, title = %title, steps = steps.len(), "Generating recipe images");

        let mut partial = RecipeImageFields::default();
        match self.enrich(&doc, &title, &steps, &mut partial).await {
            Ok(outcome) => {
                info!(doc_id = %doc.id, outcome = outcome.label(), "Recipe image enrichment finished");
                outcome
            }
            Err(e) => annotate_failure(self.store.as_ref(), &doc, &e, partial.to_fields()).await,
        }
    }

    async fn enrich(
        &self,
        doc: &DocumentRef,
        title: &str,
        steps: &[String],
        partial: &mut RecipeImageFields,
    ) -> Result<EnrichmentOutcome> {
        if title.trim().is_empty() {
            warn!(doc_id = %doc.id, "Recipe title is empty, no title image generated");
        } else {
            let object_name = format!("recipes/recipe_{}_title.png", doc.id);
            partial.title_image_url = self.images.generate(title, &object_name).await?;
        }

        for (idx, step) in steps.iter().enumerate() {
            if step.trim().is_empty() {
                continue;
            }
            let object_name = format!("recipes/recipe_{}_step_{}.png", doc.id, idx);
            let url = self.images.generate(step, &object_name).await?;
            partial.step_image_urls.push(url);
        }

        // partial is reused by the failure annotation
        write_back(self.store.as_ref(), doc, partial.to_fields()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_suggest_common::{
        generative::MockGenerator, images::StaticImageGenerator, store::InMemoryDocumentStore,
    };
    use serde_json::json;

    const PROFILE: &str = "```json\n{\"kana\": \"とまと\", \"synonyms\": [\"トマト\", \"ミニトマト\"], \"image_prompt\": \"a ripe tomato\"}\n```";

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn ingredient_event(path: &str, name: &str) -> DocumentEvent {
        DocumentEvent {
            id: "evt".into(),
            event_type: "created".into(),
            document_name: Some(format!(
                "projects/demo/databases/(default)/documents/{}",
                path
            )),
            fields: fields(json!({"name": name, "category": "野菜"})),
        }
    }

    fn recipe_event(path: &str, title: &str, steps: Value) -> DocumentEvent {
        DocumentEvent {
            id: "evt".into(),
            event_type: "created".into(),
            document_name: Some(path.to_string()),
            fields: fields(json!({"title": title, "steps": steps})),
        }
    }

    fn ingredient_enricher(
        generator: MockGenerator,
        images: Arc<StaticImageGenerator>,
        store: Arc<InMemoryDocumentStore>,
    ) -> IngredientEnricher {
        IngredientEnricher::new(
            Arc::new(generator),
            StructuredExtractor::default(),
            images,
            store,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_ingredient_enriched() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", fields(json!({"name": "トマト"})));
        let images = Arc::new(StaticImageGenerator::new("https://cdn.test"));
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", PROFILE),
            images.clone(),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "トマト"))
            .await;
        assert_eq!(outcome, EnrichmentOutcome::Updated);

        let doc = store.document("ingredients_master/t1").unwrap();
        assert_eq!(doc["name"], "トマト");
        assert_eq!(doc["kana"], "とまと");
        assert_eq!(doc["synonyms"], json!(["トマト", "ミニトマト"]));
        assert_eq!(doc["imageUrl"], "https://cdn.test/ingredients/t1.png");
        assert!(!doc.contains_key(PROCESSING_ERROR_FIELD));
        assert_eq!(
            images.calls(),
            vec![("a ripe tomato".to_string(), "ingredients/t1.png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_name_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", Fields::new());
        let generator = MockGenerator::new().with_default_response(PROFILE);
        let enricher = ingredient_enricher(
            generator,
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "  "))
            .await;
        assert!(matches!(outcome, EnrichmentOutcome::Skipped { .. }));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_path_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let enricher = ingredient_enricher(
            MockGenerator::new(),
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );

        let mut event = ingredient_event("ingredients_master/t1", "トマト");
        event.document_name = Some("ingredients_master".into());
        let outcome = enricher.process(&event).await;
        assert!(matches!(outcome, EnrichmentOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_empty_image_prompt_writes_empty_url() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", Fields::new());
        let images = Arc::new(StaticImageGenerator::default());
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response(
                "カナ表記",
                r#"{"kana": "とまと", "synonyms": [], "image_prompt": ""}"#,
            ),
            images.clone(),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "トマト"))
            .await;
        assert_eq!(outcome, EnrichmentOutcome::Updated);
        assert_eq!(store.document("ingredients_master/t1").unwrap()["imageUrl"], "");
        assert!(images.calls().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_document_not_written() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", PROFILE),
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/gone", "トマト"))
            .await;
        assert_eq!(outcome, EnrichmentOutcome::Vanished);
        assert_eq!(store.update_count(), 0);
        assert!(store.document("ingredients_master/gone").is_none());
    }

    #[tokio::test]
    async fn test_image_failure_records_partial_values() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", fields(json!({"name": "トマト"})));
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", PROFILE),
            Arc::new(StaticImageGenerator::failing()),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "トマト"))
            .await;
        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed {
                annotated: true,
                ..
            }
        ));

        let doc = store.document("ingredients_master/t1").unwrap();
        assert!(doc[PROCESSING_ERROR_FIELD]
            .as_str()
            .unwrap()
            .contains("image backend unavailable"));
        assert_eq!(doc["kana"], "とまと");
        assert_eq!(doc["synonyms"], json!(["トマト", "ミニトマト"]));
        assert_eq!(doc["imageUrl"], "");
    }

    #[tokio::test]
    async fn test_malformed_output_recorded() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", Fields::new());
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", "わかりません"),
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "トマト"))
            .await;
        assert!(matches!(outcome, EnrichmentOutcome::Failed { annotated: true, .. }));

        let doc = store.document("ingredients_master/t1").unwrap();
        assert!(doc.contains_key(PROCESSING_ERROR_FIELD));
        assert_eq!(doc["kana"], "");
        assert_eq!(doc["synonyms"], json!([]));
    }

    #[tokio::test]
    async fn test_failure_on_vanished_document_not_recorded() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let enricher = ingredient_enricher(
            MockGenerator::new().with_failure("カナ表記", "down"),
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/gone", "トマト"))
            .await;
        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed {
                annotated: false,
                ..
            }
        ));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", fields(json!({"name": "トマト"})));
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", PROFILE),
            Arc::new(StaticImageGenerator::default()),
            store.clone(),
        );
        let event = ingredient_event("ingredients_master/t1", "トマト");

        enricher.process(&event).await;
        let first = store.document("ingredients_master/t1").unwrap();
        enricher.process(&event).await;
        let second = store.document("ingredients_master/t1").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.update_count(), 2);
    }

    #[tokio::test]
    async fn test_recipe_images() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("recipes/r1", fields(json!({"title": "肉じゃが"})));
        let images = Arc::new(StaticImageGenerator::new("https://cdn.test"));
        let enricher = RecipeImageEnricher::new(images.clone(), store.clone());

        let outcome = enricher
            .process(&recipe_event(
                "recipes/r1",
                "肉じゃが",
                json!(["切る", "", "煮る"]),
            ))
            .await;
        assert_eq!(outcome, EnrichmentOutcome::Updated);

        let doc = store.document("recipes/r1").unwrap();
        assert_eq!(
            doc["titleImageUrl"],
            "https://cdn.test/recipes/recipe_r1_title.png"
        );
        assert_eq!(
            doc["stepImageUrls"],
            json!([
                "https://cdn.test/recipes/recipe_r1_step_0.png",
                "https://cdn.test/recipes/recipe_r1_step_2.png"
            ])
        );
        assert_eq!(images.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_recipe_vanished() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let enricher =
            RecipeImageEnricher::new(Arc::new(StaticImageGenerator::default()), store.clone());

        let outcome = enricher
            .process(&recipe_event("recipes/gone", "肉じゃが", json!(["煮る"])))
            .await;
        assert_eq!(outcome, EnrichmentOutcome::Vanished);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_recipe_image_failure_recorded() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("recipes/r1", Fields::new());
        let enricher =
            RecipeImageEnricher::new(Arc::new(StaticImageGenerator::failing()), store.clone());

        let outcome = enricher
            .process(&recipe_event("recipes/r1", "肉じゃが", json!(["煮る"])))
            .await;
        assert!(matches!(outcome, EnrichmentOutcome::Failed { annotated: true, .. }));

        let doc = store.document("recipes/r1").unwrap();
        assert!(doc.contains_key(PROCESSING_ERROR_FIELD));
        assert_eq!(doc["titleImageUrl"], "");
        assert_eq!(doc["stepImageUrls"], json!([]));
    }

    #[tokio::test]
    async fn test_write_back_failure_keeps_obtained_values() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("ingredients_master/t1", fields(json!({"name": "トマト"})));
        store.fail_next_writes(1);
        let enricher = ingredient_enricher(
            MockGenerator::new().with_response("カナ表記", PROFILE),
            Arc::new(StaticImageGenerator::new("https://cdn.test")),
            store.clone(),
        );

        let outcome = enricher
            .process(&ingredient_event("ingredients_master/t1", "トマト"))
            .await;
        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed {
                annotated: true,
                ..
            }
        ));

        let doc = store.document("ingredients_master/t1").unwrap();
        assert!(doc[PROCESSING_ERROR_FIELD]
            .as_str()
            .unwrap()
            .contains("document_store"));
        assert_eq!(doc["kana"], "とまと");
        assert_eq!(doc["synonyms"], json!(["トマト", "ミニトマト"]));
        assert_eq!(doc["imageUrl"], "https://cdn.test/ingredients/t1.png");
    }

    #[tokio::test]
    async fn test_recipe_write_back_failure_keeps_image_urls() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert("recipes/r1", Fields::new());
        store.fail_next_writes(1);
        let enricher = RecipeImageEnricher::new(
            Arc::new(StaticImageGenerator::new("https://cdn.test")),
            store.clone(),
        );

        let outcome = enricher
            .process(&recipe_event("recipes/r1", "肉じゃが", json!(["煮る"])))
            .await;
        assert!(matches!(outcome, EnrichmentOutcome::Failed { annotated: true, .. }));

        let doc = store.document("recipes/r1").unwrap();
        assert!(doc.contains_key(PROCESSING_ERROR_FIELD));
        assert_eq!(
            doc["titleImageUrl"],
            "https://cdn.test/recipes/recipe_r1_title.png"
        );
        assert_eq!(
            doc["stepImageUrls"],
            json!(["https://cdn.test/recipes/recipe_r1_step_0.png"])
        );
    }
}
