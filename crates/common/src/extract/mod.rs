//! Structured extraction of JSON embedded in free-form model output
//!
//! Model answers often wrap the JSON in markdown code fences or surround it
//! with prose. Extraction either yields a fully parsed value or fails with
//! `AppError::MalformedOutput`; it never returns unparsed text.

use crate::errors::{preview, AppError, Result, DEFAULT_PREVIEW_CHARS};
use crate::prompt::OutputShape;
use serde::de::DeserializeOwned;
use serde_json::Value;

const FENCE: &str = "```";

/// Extracts JSON values from generative output
#[derive(Debug, Clone, Copy)]
pub struct StructuredExtractor {
    preview_chars: usize,
}

impl Default for StructuredExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl StructuredExtractor {
    /// Create an extractor keeping at most `preview_chars` of failing text
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    /// Locate and parse the JSON value of the expected shape inside `text`
    pub fn extract(&self, text: &str, shape: OutputShape) -> Result<Value> {
        let cleaned = strip_code_fences(text);
        if cleaned.is_empty() {
            return Err(self.malformed("cleaned text is empty", text));
        }

        if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
            return Ok(value);
        }

        let (open, close) = match shape {
            OutputShape::Array => ('[', ']'),
            OutputShape::Object => ('{', '}'),
        };

        let span = match (cleaned.find(open), cleaned.rfind(close)) {
            (Some(start), Some(end)) if start < end => &cleaned[start..=end],
            _ => return Err(self.malformed("no JSON found in response", text)),
        };

        serde_json::from_str(span)
            .map_err(|e| self.malformed(format!("invalid JSON: {}", e), text))
    }

    /// Extract and deserialize into a typed value
    pub fn extract_as<T: DeserializeOwned>(&self, text: &str, shape: OutputShape) -> Result<T> {
        let value = self.extract(text, shape)?;
        serde_json::from_value(value)
            .map_err(|e| self.malformed(format!("unexpected JSON shape: {}", e), text))
    }

    fn malformed(&self, message: impl Into<String>, raw: &str) -> AppError {
        let message = message.into();
        let raw = preview(raw, self.preview_chars);
        tracing::warn!(error = %message, raw = %raw, "Failed to extract structured output");
        metrics::counter!("recipe_suggest_extraction_failures_total").increment(1);
        AppError::MalformedOutput {
            message,
            preview: raw,
        }
    }
}

/// Remove a leading fence (with optional language tag) and a trailing fence
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();

    if let Some(rest) = cleaned.strip_prefix(FENCE) {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+'))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        cleaned = if after_tag.is_empty() || after_tag.starts_with(char::is_whitespace) {
            after_tag
        } else {
            rest
        };
    }

    if let Some(rest) = cleaned.trim_end().strip_suffix(FENCE) {
        cleaned = rest;
    }

    cleaned.trim()
}
