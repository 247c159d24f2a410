//! Blog CMS client
//!
//! Posts `{title, content, status}` to a WordPress-compatible endpoint with
//! basic authentication. A non-2xx answer is a recorded outcome, not an error.

use crate::config::CmsConfig;
use crate::errors::{preview, AppError, Result, DEFAULT_PREVIEW_CHARS};
use crate::models::BlogPost;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Result of a CMS post attempt that reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmsOutcome {
    Published { id: Option<u64> },
    Rejected { status: u16, body_preview: String },
}

/// Trait for posting articles to a CMS
#[async_trait]
pub trait BlogPublisher: Send + Sync {
    async fn publish(&self, post: &BlogPost) -> Result<CmsOutcome>;
}

#[derive(Serialize)]
struct CreatePostRequest<'a> {
    title: &'a str,
    content: &'a str,
    status: &'a str,
}

#[derive(Deserialize)]
struct CreatePostResponse {
    id: Option<u64>,
}

/// WordPress REST client
pub struct WordPressClient {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    app_password: String,
}

impl WordPressClient {
    pub fn new(endpoint: String, user: String, app_password: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            user,
            app_password,
        })
    }
}

#[async_trait]
impl BlogPublisher for WordPressClient {
    async fn publish(&self, post: &BlogPost) -> Result<CmsOutcome> {
        let request = CreatePostRequest {
            title: &post.title,
            content: &post.content,
            status: post.status.as_str(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.user, Some(&self.app_password))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable {
                service: "cms".to_string(),
                status: None,
                detail: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %preview(&body, DEFAULT_PREVIEW_CHARS), "CMS rejected post");
            return Ok(CmsOutcome::Rejected {
                status: status.as_u16(),
                body_preview: preview(&body, DEFAULT_PREVIEW_CHARS),
            });
        }

        let id = serde_json::from_str::<CreatePostResponse>(&body)
            .ok()
            .and_then(|r| r.id);
        info!(post_id = ?id, title = %post.title, "Blog post published");
        Ok(CmsOutcome::Published { id })
    }
}

/// Publisher that records posts in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    posts: Mutex<Vec<BlogPost>>,
    reject_status: Option<u16>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every post with the given non-2xx status
    pub fn rejecting(status: u16) -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            reject_status: Some(status),
        }
    }

    pub fn posts(&self) -> Vec<BlogPost> {
        self.posts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BlogPublisher for RecordingPublisher {
    async fn publish(&self, post: &BlogPost) -> Result<CmsOutcome> {
        if let Some(status) = self.reject_status {
            return Ok(CmsOutcome::Rejected {
                status,
                body_preview: "rejected".to_string(),
            });
        }
        let mut posts = self.posts.lock().map_err(|_| AppError::Internal {
            message: "publisher lock poisoned".to_string(),
        })?;
        posts.push(post.clone());
        Ok(CmsOutcome::Published {
            id: Some(posts.len() as u64),
        })
    }
}

/// Create a CMS publisher; `None` when posting is disabled
pub fn create_publisher(config: &CmsConfig) -> Result<Option<Arc<dyn BlogPublisher>>> {
    if !config.enabled {
        return Ok(None);
    }

    let (user, password) = match (&config.user, &config.app_password) {
        (Some(user), Some(password)) => (user.clone(), password.clone()),
        _ => {
            return Err(AppError::Configuration {
                message: "cms.user and cms.app_password are required when cms is enabled"
                    .to_string(),
            })
        }
    };

    Ok(Some(Arc::new(WordPressClient::new(
        config.endpoint.clone(),
        user,
        password,
        Duration::from_secs(config.timeout_secs),
    )?)))
}
