//! Generative text API abstraction
//!
//! Provides a unified interface over:
//! - Gemini `generateContent` (candidates -> content -> parts -> text)
//! - A scripted mock for tests and local development
//!
//! Every call is attempted exactly once; there is no retry.

use crate::config::GenerativeConfig;
use crate::errors::{preview, AppError, Result, DEFAULT_PREVIEW_CHARS};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Trait for generative text completion
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a prompt and return the raw text of the first candidate
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;

    /// Get the model or provider name
    fn model_name(&self) -> &str;
}

/// Gemini REST client
pub struct GeminiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_url: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }

    async fn make_request(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable {
                service: "gemini".to_string(),
                status: None,
                detail: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::UpstreamUnavailable {
            service: "gemini".to_string(),
            status: Some(status.as_u16()),
            detail: format!("Failed to read response: {}", e),
        })?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                body = %preview(&body, DEFAULT_PREVIEW_CHARS),
                "Gemini API returned an error"
            );
            return Err(AppError::upstream("gemini", Some(status.as_u16()), &body));
        }

        first_candidate_text(&body)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body
fn first_candidate_text(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AppError::malformed(format!("Failed to parse response: {}", e), body))?;

    let candidate = parsed.candidates.into_iter().next().ok_or_else(|| {
        error!(body = %preview(body, DEFAULT_PREVIEW_CHARS), "No candidates returned");
        AppError::UpstreamUnavailable {
            service: "gemini".to_string(),
            status: None,
            detail: "no candidates returned".to_string(),
        }
    })?;

    candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| AppError::malformed("text not found in parts", body))
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        metrics::counter!("recipe_suggest_generation_requests_total").increment(1);

        let result = self.make_request(prompt, timeout).await;

        metrics::histogram!("recipe_suggest_generation_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        match &result {
            Ok(text) => debug!(chars = text.chars().count(), "Generation completed"),
            Err(e) => {
                metrics::counter!("recipe_suggest_generation_errors_total").increment(1);
                error!(error = %e, "Generation failed");
            }
        }
        result
    }

    fn model_name(&self) -> &str {
        "gemini"
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Unavailable(String),
}

/// Scripted generator for tests and local development
///
/// Replies are matched by prompt substring in registration order.
#[derive(Debug, Default)]
pub struct MockGenerator {
    replies: Vec<(String, MockReply)>,
    default_reply: Option<MockReply>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Create a mock with no scripted replies; every call fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` when the prompt contains `prompt_contains`
    pub fn with_response(mut self, prompt_contains: &str, response: &str) -> Self {
        self.replies.push((
            prompt_contains.to_string(),
            MockReply::Text(response.to_string()),
        ));
        self
    }

    /// Fail as an unavailable upstream when the prompt contains `prompt_contains`
    pub fn with_failure(mut self, prompt_contains: &str, detail: &str) -> Self {
        self.replies.push((
            prompt_contains.to_string(),
            MockReply::Unavailable(detail.to_string()),
        ));
        self
    }

    /// Reply used when no pattern matches
    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_reply = Some(MockReply::Text(response.to_string()));
        self
    }

    /// Canned answers for every prompt kind, used when no API key is configured
    pub fn with_canned_responses() -> Self {
        Self::new()
            .with_response(
                "手元の食材",
                "[]",
            )
            .with_response(
                "カナ表記",
                r#"{"kana": "とまと", "synonyms": ["トマト", "赤茄子", "ミニトマト"], "image_prompt": "a fresh red tomato on a white background"}"#,
            )
            .with_response(
                "ブログの記事",
                r#"{"title": "おうちで簡単レシピ", "content": "<h2>おうちで簡単レシピ</h2><p>身近な食材で作れる一品です。</p>"}"#,
            )
            .with_response(
                "レシピ",
                r#"```json
[{"title": "卵とトマトの炒め物", "description": "ふんわり卵とトマトの定番おかず", "ingredients": ["卵 2個", "トマト 1個", "塩 少々"], "steps": ["卵を溶く", "トマトを切る", "炒め合わせる"]}]
```"#,
            )
    }

    /// Number of generate calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .replies
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, reply)| reply)
            .or(self.default_reply.as_ref());

        match reply {
            Some(MockReply::Text(text)) => Ok(text.clone()),
            Some(MockReply::Unavailable(detail)) => Err(AppError::UpstreamUnavailable {
                service: "mock".to_string(),
                status: Some(503),
                detail: detail.clone(),
            }),
            None => Err(AppError::UpstreamUnavailable {
                service: "mock".to_string(),
                status: None,
                detail: format!(
                    "no candidates returned for prompt: {}",
                    preview(prompt, 100)
                ),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerativeConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "gemini" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "generative.api_key is required for the gemini provider".to_string(),
            })?;
            info!(url = %config.api_url, "Using Gemini generator");
            Ok(Arc::new(GeminiClient::new(config.api_url.clone(), key)?))
        }
        "mock" => Ok(Arc::new(MockGenerator::with_canned_responses())),
        other => {
            tracing::warn!(provider = other, "Unknown generative provider, using mock");
            Ok(Arc::new(MockGenerator::with_canned_responses()))
        }
    }
}
