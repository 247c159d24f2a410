//! Document store layer
//!
//! Provides:
//! - The `DocumentStore` trait used by every writer
//! - A Firestore REST implementation
//! - An in-memory implementation for tests and local runs
//! - Document path helpers for trigger payloads
//!
//! Writes are overwrite-idempotent: updating the same fields twice with the
//! same values leaves the document unchanged.

mod firestore;
mod memory;

pub use firestore::{decode_fields, encode_fields, FirestoreClient};
pub use memory::InMemoryDocumentStore;

use crate::config::DocumentStoreConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field map of a document
pub type Fields = Map<String, Value>;

/// Trait for document store access
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document by collection-relative path; `None` if absent
    async fn get(&self, path: &str) -> Result<Option<Fields>>;

    /// Whether the document exists
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// Overwrite the given fields of an existing document
    ///
    /// Fails with `AppError::DocumentVanished` if the document is absent.
    async fn update(&self, path: &str, fields: Fields) -> Result<()>;

    /// Create a new document with a generated id
    ///
    /// Every name in `server_timestamps` is set to the store's clock.
    async fn create(
        &self,
        collection: &str,
        fields: Fields,
        server_timestamps: &[&str],
    ) -> Result<String>;
}

/// Reference to a document named by a trigger payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Collection-relative path, e.g. `ingredients_master/abc`
    pub path: String,
    /// Last path segment
    pub id: String,
}

impl DocumentRef {
    /// Parse a full resource name or a relative path
    ///
    /// `projects/p/databases/(default)/documents/recipes/r1` and `recipes/r1`
    /// both yield path `recipes/r1`, id `r1`.
    pub fn parse(name: &str) -> Option<Self> {
        let relative = match name.find("/documents/") {
            Some(idx) => &name[idx + "/documents/".len()..],
            None => name,
        };
        let relative = relative.trim_matches('/');

        let segments: Vec<&str> = relative.split('/').collect();
        if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        Some(Self {
            path: relative.to_string(),
            id: segments[segments.len() - 1].to_string(),
        })
    }
}

/// Create a document store based on configuration
pub fn create_document_store(config: &DocumentStoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.provider.as_str() {
        "firestore" => {
            let project_id = config.project_id.clone().ok_or_else(|| AppError::Configuration {
                message: "document_store.project_id is required for firestore".to_string(),
            })?;
            Ok(Arc::new(FirestoreClient::new(
                &config.base_url,
                &project_id,
                &config.database_id,
                config.access_token.clone(),
                std::time::Duration::from_secs(config.timeout_secs),
            )?))
        }
        "memory" => Ok(Arc::new(InMemoryDocumentStore::new())),
        other => {
            tracing::warn!(provider = other, "Unknown document store provider, using memory");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}
