//! Error types for Recipe Suggest services
//!
//! Provides the failure taxonomy shared by every entry point:
//! - Missing or invalid request input (HTTP 400)
//! - Upstream failures of the generative API, CMS, image or document services
//! - Generative output that cannot be parsed into the expected shape
//! - Documents that disappeared between trigger and write

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Default number of characters kept when previewing upstream text
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors (1xxx)
    MissingInput,
    ValidationError,

    // Upstream errors (8xxx)
    UpstreamUnavailable,
    MalformedOutput,
    DocumentVanished,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::MissingInput => 1001,
            ErrorCode::ValidationError => 1002,

            ErrorCode::UpstreamUnavailable => 8001,
            ErrorCode::MalformedOutput => 8002,
            ErrorCode::DocumentVanished => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{field} required")]
    MissingInput { field: String },

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("{service} unavailable: {detail}")]
    UpstreamUnavailable {
        service: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Malformed generative output: {message}")]
    MalformedOutput { message: String, preview: String },

    #[error("Document vanished before write: {path}")]
    DocumentVanished { path: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Build an upstream failure from a non-success HTTP exchange
    pub fn upstream(service: &str, status: Option<u16>, body: &str) -> Self {
        AppError::UpstreamUnavailable {
            service: service.to_string(),
            status,
            detail: preview(body, DEFAULT_PREVIEW_CHARS),
        }
    }

    /// Build a parse failure carrying a bounded preview of the offending text
    pub fn malformed(message: impl Into<String>, raw: &str) -> Self {
        AppError::MalformedOutput {
            message: message.into(),
            preview: preview(raw, DEFAULT_PREVIEW_CHARS),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::MissingInput { .. } => ErrorCode::MissingInput,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::UpstreamUnavailable { .. } => ErrorCode::UpstreamUnavailable,
            AppError::HttpClient(_) => ErrorCode::UpstreamUnavailable,
            AppError::MalformedOutput { .. } => ErrorCode::MalformedOutput,
            AppError::DocumentVanished { .. } => ErrorCode::DocumentVanished,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Internal { .. } | AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingInput { .. } | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Bounded diagnostic text returned to HTTP callers as `detail`
    pub fn detail(&self) -> Option<String> {
        match self {
            AppError::UpstreamUnavailable { detail, .. } => Some(detail.clone()),
            AppError::HttpClient(e) => Some(preview(&e.to_string(), DEFAULT_PREVIEW_CHARS)),
            AppError::Validation { field: Some(field), .. } => Some(field.clone()),
            _ => None,
        }
    }

    /// Raw model text attached to parse failures
    pub fn raw(&self) -> Option<&str> {
        match self {
            AppError::MalformedOutput { preview, .. } => Some(preview),
            _ => None,
        }
    }
}

/// Error body returned by the HTTP entry point
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            detail: self.detail(),
            raw: self.raw().map(str::to_string),
            error: message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters, on a char boundary
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_is_client_error() {
        let err = AppError::MissingInput {
            field: "ingredients".into(),
        };
        assert_eq!(err.code(), ErrorCode::MissingInput);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "ingredients required");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_malformed_output_keeps_bounded_raw() {
        let raw = "x".repeat(2000);
        let err = AppError::malformed("no JSON found", &raw);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let kept = err.raw().unwrap();
        assert_eq!(kept.chars().count(), DEFAULT_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_upstream_detail() {
        let err = AppError::upstream("gemini", Some(503), "overloaded");
        assert_eq!(err.code(), ErrorCode::UpstreamUnavailable);
        assert_eq!(err.detail().as_deref(), Some("overloaded"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("豚肉と玉ねぎ", 2), "豚肉...");
        assert_eq!(preview("short", 10), "short");
    }
}
