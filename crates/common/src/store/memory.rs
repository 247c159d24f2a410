//! In-memory document store

use super::{DocumentStore, Fields};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// Document store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Fields>>,
    updates: AtomicUsize,
    fail_writes: AtomicBool,
    failing_writes_left: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole document
    pub fn insert(&self, path: &str, fields: Fields) {
        if let Ok(mut docs) = self.documents.write() {
            docs.insert(path.to_string(), fields);
        }
    }

    /// Remove a document
    pub fn remove(&self, path: &str) {
        if let Ok(mut docs) = self.documents.write() {
            docs.remove(path);
        }
    }

    /// Snapshot of a document
    pub fn document(&self, path: &str) -> Option<Fields> {
        self.documents.read().ok()?.get(path).cloned()
    }

    /// Documents whose path starts with `collection/`
    pub fn collection(&self, collection: &str) -> Vec<(String, Fields)> {
        let prefix = format!("{}/", collection);
        self.documents
            .read()
            .map(|docs| {
                docs.iter()
                    .filter(|(path, _)| path.starts_with(&prefix))
                    .map(|(path, fields)| (path.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of update calls that reached an existing document
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail as an unavailable upstream
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only the next `count` writes fail as an unavailable upstream
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes_left.store(count, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        let one_shot = self
            .failing_writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if one_shot || self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable {
                service: "document_store".to_string(),
                status: Some(503),
                detail: "writes disabled".to_string(),
            });
        }
        Ok(())
    }

    fn poisoned() -> AppError {
        AppError::Internal {
            message: "document store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Fields>> {
        let docs = self.documents.read().map_err(|_| Self::poisoned())?;
        Ok(docs.get(path).cloned())
    }

    async fn update(&self, path: &str, fields: Fields) -> Result<()> {
        self.check_writable()?;
        let mut docs = self.documents.write().map_err(|_| Self::poisoned())?;
        let doc = docs.get_mut(path).ok_or_else(|| AppError::DocumentVanished {
            path: path.to_string(),
        })?;
        for (key, value) in fields {
            doc.insert(key, value);
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        mut fields: Fields,
        server_timestamps: &[&str],
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::new_v4().simple().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        for name in server_timestamps {
            fields.insert(name.to_string(), Value::String(now.clone()));
        }

        let mut docs = self.documents.write().map_err(|_| Self::poisoned())?;
        docs.insert(format!("{}/{}", collection, id), fields);
        Ok(id)
    }
}
