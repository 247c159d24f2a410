//! Image generation and public storage
//!
//! Provides:
//! - The `ImageGenerator` trait returning a public URL for a prompt
//! - Vertex AI `:predict` generation uploaded to Cloud Storage
//! - A static fake for tests and runs without an image backend

use crate::config::ImageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Public URL prefix for stored objects
pub const STORAGE_PUBLIC_URL: &str = "https://storage.googleapis.com";

/// Trait for prompt-to-image generation
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for `prompt`, store it as `object_name` and return its public URL
    async fn generate(&self, prompt: &str, object_name: &str) -> Result<String>;
}

/// Public URL of an object in a bucket
pub fn public_url(bucket: &str, object_name: &str) -> String {
    format!("{}/{}/{}", STORAGE_PUBLIC_URL, bucket, object_name)
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

/// Vertex AI image model with Cloud Storage upload
pub struct VertexImageGenerator {
    client: reqwest::Client,
    predict_url: String,
    bucket: String,
    access_token: Option<String>,
}

impl VertexImageGenerator {
    pub fn new(
        project_id: &str,
        location: &str,
        model: &str,
        bucket: String,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let predict_url = format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}:predict",
            loc = location,
            project = project_id,
            model = model,
        );

        Ok(Self {
            client,
            predict_url,
            bucket,
            access_token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn predict(&self, prompt: &str) -> Result<Vec<u8>> {
        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1 },
        });

        let response = self
            .authorize(self.client.post(&self.predict_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable {
                service: "vertex".to_string(),
                status: None,
                detail: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(status = status.as_u16(), "Image generation failed");
            return Err(AppError::upstream("vertex", Some(status.as_u16()), &text));
        }

        let parsed: PredictResponse = serde_json::from_str(&text)?;
        let encoded = parsed
            .predictions
            .into_iter()
            .next()
            .and_then(|p| p.bytes_base64_encoded)
            .unwrap_or_default();

        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(|e| {
            AppError::malformed(format!("image payload is not base64: {}", e), &text)
        })?;

        if bytes.is_empty() {
            return Err(AppError::UpstreamUnavailable {
                service: "vertex".to_string(),
                status: Some(status.as_u16()),
                detail: "no image bytes returned".to_string(),
            });
        }
        Ok(bytes)
    }

    async fn upload(&self, object_name: &str, bytes: Vec<u8>) -> Result<String> {
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o",
            self.bucket
        );

        let response = self
            .authorize(self.client.post(url))
            .query(&[
                ("uploadType", "media"),
                ("name", object_name),
                ("predefinedAcl", "publicRead"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnavailable {
                service: "storage".to_string(),
                status: None,
                detail: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), object = object_name, "Image upload failed");
            return Err(AppError::upstream("storage", Some(status.as_u16()), &text));
        }

        Ok(public_url(&self.bucket, object_name))
    }

    async fn predict_and_upload(&self, prompt: &str, object_name: &str) -> Result<String> {
        let bytes = self.predict(prompt).await?;
        debug!(object = object_name, size = bytes.len(), "Image generated");
        self.upload(object_name, bytes).await
    }
}

#[async_trait]
impl ImageGenerator for VertexImageGenerator {
    async fn generate(&self, prompt: &str, object_name: &str) -> Result<String> {
        let start = Instant::now();
        metrics::counter!("recipe_suggest_image_requests_total").increment(1);

        let result = self.predict_and_upload(prompt, object_name).await;

        metrics::histogram!("recipe_suggest_image_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::counter!("recipe_suggest_image_errors_total").increment(1);
        }
        result
    }
}

/// Image generator that returns a fixed URL scheme and records its calls
#[derive(Debug)]
pub struct StaticImageGenerator {
    base_url: String,
    calls: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl Default for StaticImageGenerator {
    fn default() -> Self {
        Self::new("https://images.invalid")
    }
}

impl StaticImageGenerator {
    /// URLs are `{base_url}/{object_name}`
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Every call fails as an unavailable upstream
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(prompt, object_name)` pairs received so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageGenerator for StaticImageGenerator {
    async fn generate(&self, prompt: &str, object_name: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.to_string(), object_name.to_string()));
        }
        if self.fail {
            return Err(AppError::UpstreamUnavailable {
                service: "images".to_string(),
                status: Some(503),
                detail: "image backend unavailable".to_string(),
            });
        }
        Ok(format!("{}/{}", self.base_url, object_name))
    }
}

/// Create an image generator based on configuration
pub fn create_image_generator(config: &ImageConfig) -> Result<Arc<dyn ImageGenerator>> {
    match config.provider.as_str() {
        "vertex" => {
            let bucket = config.bucket.clone().ok_or_else(|| AppError::Configuration {
                message: "images.bucket is required for the vertex provider".to_string(),
            })?;
            let project_id = config.project_id.clone().ok_or_else(|| AppError::Configuration {
                message: "images.project_id is required for the vertex provider".to_string(),
            })?;
            info!(model = %config.model, bucket = %bucket, "Using Vertex image generator");
            Ok(Arc::new(VertexImageGenerator::new(
                &project_id,
                &config.location,
                &config.model,
                bucket,
                config.access_token.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "none" | "static" => Ok(Arc::new(StaticImageGenerator::default())),
        other => {
            tracing::warn!(provider = other, "Unknown image provider, using static");
            Ok(Arc::new(StaticImageGenerator::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("bucket-1", "ingredients/abc.png"),
            "https://storage.googleapis.com/bucket-1/ingredients/abc.png"
        );
    }

    #[test]
    fn test_vertex_requires_bucket() {
        let config = ImageConfig {
            provider: "vertex".to_string(),
            project_id: Some("demo".to_string()),
            ..ImageConfig::default()
        };
        assert!(matches!(
            create_image_generator(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_static_generator_records_calls() {
        let images = StaticImageGenerator::new("https://cdn.test/");
        let url = images.generate("a tomato", "ingredients/t1.png").await.unwrap();
        assert_eq!(url, "https://cdn.test/ingredients/t1.png");
        assert_eq!(
            images.calls(),
            vec![("a tomato".to_string(), "ingredients/t1.png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_failing_generator() {
        let images = StaticImageGenerator::failing();
        tokio_test::assert_err!(images.generate("x", "y.png").await);
        assert_eq!(images.calls().len(), 1);
    }
}
