//! Blog publishing fan-out
//!
//! A recipe title becomes a generated article, which is then archived in the
//! document store and posted to the CMS. The two writes are independent: a
//! failure in one never undoes or prevents the other.

use crate::cms::{BlogPublisher, CmsOutcome};
use crate::errors::{AppError, Result};
use crate::extract::StructuredExtractor;
use crate::generative::TextGenerator;
use crate::models::{BlogArticle, BlogPost, PostStatus, Recipe};
use crate::prompt::PromptKind;
use crate::store::{DocumentStore, Fields};
use crate::tasks::TaskSubmitter;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Outcome of one publishing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step succeeded; carries the id assigned by the target, if any
    Done(Option<String>),
    /// Step not configured
    Skipped,
    /// Step failed; carries the reason
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Done(_) => "done",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-step result of a publish run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub article_title: String,
    pub archive: StepOutcome,
    pub cms: StepOutcome,
}

impl PublishReport {
    /// True when every configured sink failed, so no copy of the article exists
    pub fn stored_nowhere(&self) -> bool {
        let mut attempted = [&self.archive, &self.cms]
            .into_iter()
            .filter(|outcome| **outcome != StepOutcome::Skipped)
            .peekable();
        attempted.peek().is_some() && attempted.all(StepOutcome::is_failed)
    }
}

/// Generates, archives and posts blog articles
pub struct PublishCoordinator {
    generator: Arc<dyn TextGenerator>,
    extractor: StructuredExtractor,
    store: Arc<dyn DocumentStore>,
    cms: Option<Arc<dyn BlogPublisher>>,
    collection: String,
    status: PostStatus,
    timeout: Duration,
}

impl PublishCoordinator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        extractor: StructuredExtractor,
        store: Arc<dyn DocumentStore>,
        cms: Option<Arc<dyn BlogPublisher>>,
        collection: impl Into<String>,
        status: PostStatus,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            extractor,
            store,
            cms,
            collection: collection.into(),
            status,
            timeout,
        }
    }

    /// Generate an article about a recipe title
    pub async fn generate_article(&self, recipe_title: &str) -> Result<BlogArticle> {
        let kind = PromptKind::BlogArticle {
            recipe_title: recipe_title.to_string(),
        };
        let text = self.generator.generate(&kind.build(), self.timeout).await?;
        let article: BlogArticle = self.extractor.extract_as(&text, kind.output_shape())?;
        if article.title.trim().is_empty() || article.content.trim().is_empty() {
            return Err(AppError::malformed("article title or content is empty", &text));
        }
        Ok(article)
    }

    /// Run every step for the given recipe
    ///
    /// Fails only when no article could be produced; archive and CMS
    /// failures are reported in the returned `PublishReport`.
    #[instrument(skip(self, recipe), fields(recipe_title = %recipe.title))]
    pub async fn publish(&self, recipe: &Recipe) -> Result<PublishReport> {
        let article = self.generate_article(&recipe.title).await?;
        let post = BlogPost::from_article(article, recipe.ingredients.clone(), self.status);

        let archive = self.archive(&post).await;
        let cms = self.post_to_cms(&post).await;

        for (step, outcome) in [("archive", &archive), ("cms", &cms)] {
            metrics::counter!(
                "recipe_suggest_publish_steps_total",
                "step" => step,
                "outcome" => outcome.label()
            )
            .increment(1);
        }

        info!(
            title = %post.title,
            archive = archive.label(),
            cms = cms.label(),
            "Publish run finished"
        );

        Ok(PublishReport {
            article_title: post.title,
            archive,
            cms,
        })
    }

    /// Submit a publish run for `recipe` as detached work
    pub fn submit(self: &Arc<Self>, submitter: &dyn TaskSubmitter, recipe: Recipe) {
        let coordinator = Arc::clone(self);
        submitter.submit(
            "publish_blog",
            async move {
                let report = coordinator.publish(&recipe).await?;
                if report.stored_nowhere() {
                    return Err(AppError::Internal {
                        message: format!("no copy of '{}' was stored", report.article_title),
                    });
                }
                Ok(())
            }
            .boxed(),
        );
    }

    async fn archive(&self, post: &BlogPost) -> StepOutcome {
        let fields = match serde_json::to_value(post) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Fields::new(),
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };

        match self.store.create(&self.collection, fields, &["createdAt"]).await {
            Ok(id) => {
                info!(collection = %self.collection, doc_id = %id, "Blog post archived");
                StepOutcome::Done(Some(id))
            }
            Err(e) => {
                error!(error = %e, "Failed to archive blog post");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn post_to_cms(&self, post: &BlogPost) -> StepOutcome {
        let Some(cms) = &self.cms else {
            return StepOutcome::Skipped;
        };

        match cms.publish(post).await {
            Ok(CmsOutcome::Published { id }) => StepOutcome::Done(id.map(|id| id.to_string())),
            Ok(CmsOutcome::Rejected {
                status,
                body_preview,
            }) => {
                warn!(status, "CMS post recorded as failed");
                StepOutcome::Failed(format!("status {}: {}", status, body_preview))
            }
            Err(e) => {
                error!(error = %e, "Failed to post to CMS");
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::RecordingPublisher;
    use crate::generative::MockGenerator;
    use crate::store::InMemoryDocumentStore;
    use crate::tasks::DeferredTaskSubmitter;

    const ARTICLE: &str = r#"```json
{"title": "肉じゃがの作り方", "content": "<h2>肉じゃが</h2><p>ほっとする味</p>"}
```"#;

    fn recipe() -> Recipe {
        Recipe {
            title: "肉じゃが".into(),
            description: "定番の煮物".into(),
            ingredients: vec!["じゃがいも 2個".into(), "豚肉 200g".into()],
            steps: vec!["切る".into(), "煮る".into()],
        }
    }

    fn coordinator(
        generator: MockGenerator,
        store: Arc<InMemoryDocumentStore>,
        cms: Option<Arc<RecordingPublisher>>,
    ) -> PublishCoordinator {
        PublishCoordinator::new(
            Arc::new(generator),
            StructuredExtractor::default(),
            store,
            cms.map(|c| c as Arc<dyn BlogPublisher>),
            "blog_posts",
            PostStatus::Publish,
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn test_publish_archives_and_posts() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cms = Arc::new(RecordingPublisher::new());
        let coordinator = coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store.clone(),
            Some(cms.clone()),
        );

        let report = coordinator.publish(&recipe()).await.unwrap();
        assert_eq!(report.article_title, "肉じゃがの作り方");
        assert!(matches!(report.archive, StepOutcome::Done(Some(_))));
        assert_eq!(report.cms, StepOutcome::Done(Some("1".into())));

        let docs = store.collection("blog_posts");
        assert_eq!(docs.len(), 1);
        let (_, doc) = &docs[0];
        assert_eq!(doc["title"], "肉じゃがの作り方");
        assert_eq!(doc["status"], "publish");
        assert_eq!(doc["ingredients"][1], "豚肉 200g");
        assert!(doc.contains_key("createdAt"));
        assert_eq!(cms.posts()[0].title, "肉じゃがの作り方");
    }

    #[tokio::test]
    async fn test_archive_failure_does_not_stop_cms() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.fail_writes(true);
        let cms = Arc::new(RecordingPublisher::new());
        let coordinator = coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store,
            Some(cms.clone()),
        );

        let report = coordinator.publish(&recipe()).await.unwrap();
        assert!(report.archive.is_failed());
        assert!(!report.cms.is_failed());
        assert_eq!(cms.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_cms_rejection_keeps_archive() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let coordinator = coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store.clone(),
            Some(Arc::new(RecordingPublisher::rejecting(401))),
        );

        let report = coordinator.publish(&recipe()).await.unwrap();
        assert!(report.cms.is_failed());
        assert_eq!(store.collection("blog_posts").len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cms_is_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let coordinator = coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store,
            None,
        );

        let report = coordinator.publish(&recipe()).await.unwrap();
        assert_eq!(report.cms, StepOutcome::Skipped);
        assert!(!report.stored_nowhere());
    }

    #[tokio::test]
    async fn test_archive_failure_with_disabled_cms_stores_nowhere() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.fail_writes(true);
        let coordinator = coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store,
            None,
        );

        let report = coordinator.publish(&recipe()).await.unwrap();
        assert!(report.archive.is_failed());
        assert_eq!(report.cms, StepOutcome::Skipped);
        assert!(report.stored_nowhere());
    }

    #[test]
    fn test_stored_nowhere_needs_every_attempted_sink_to_fail() {
        let report = |archive, cms| PublishReport {
            article_title: "t".into(),
            archive,
            cms,
        };
        let failed = || StepOutcome::Failed("x".into());

        assert!(report(failed(), failed()).stored_nowhere());
        assert!(!report(failed(), StepOutcome::Done(None)).stored_nowhere());
        assert!(!report(StepOutcome::Done(None), failed()).stored_nowhere());
        assert!(!report(StepOutcome::Skipped, StepOutcome::Skipped).stored_nowhere());
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let cms = Arc::new(RecordingPublisher::new());
        let coordinator = coordinator(
            MockGenerator::new().with_failure("ブログの記事", "quota"),
            store.clone(),
            Some(cms.clone()),
        );

        tokio_test::assert_err!(coordinator.publish(&recipe()).await);
        assert!(store.collection("blog_posts").is_empty());
        assert!(cms.posts().is_empty());
    }

    #[tokio::test]
    async fn test_submit_runs_only_when_drained() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let coordinator = Arc::new(coordinator(
            MockGenerator::new().with_response("ブログの記事", ARTICLE),
            store.clone(),
            None,
        ));
        let submitter = DeferredTaskSubmitter::new();

        coordinator.submit(&submitter, recipe());
        assert!(store.collection("blog_posts").is_empty());

        submitter.run_all().await.unwrap();
        assert_eq!(store.collection("blog_posts").len(), 1);
    }
}
