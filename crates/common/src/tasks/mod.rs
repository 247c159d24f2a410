//! Detached task submission
//!
//! Work submitted here runs after the caller has its answer. Nobody observes
//! the result: failures are logged as detached task failures and dropped.
//!
//! `TokioTaskSubmitter` is best-effort. Tasks still running when the process
//! is recycled are lost; there is no ordering between tasks and no way to
//! cancel one.

use crate::errors::{AppError, Result};
use futures::future::BoxFuture;
use std::sync::Mutex;
use tracing::{error, info, Instrument};

/// A unit of detached work
pub type DetachedTask = BoxFuture<'static, Result<()>>;

/// Non-blocking submission of detached work
pub trait TaskSubmitter: Send + Sync {
    fn submit(&self, name: &'static str, task: DetachedTask);
}

async fn run_detached(name: &'static str, task: DetachedTask) {
    match task.await {
        Ok(()) => {
            metrics::counter!("recipe_suggest_detached_tasks_total", "outcome" => "ok").increment(1);
            info!(task = name, "Detached task completed");
        }
        Err(e) => {
            metrics::counter!("recipe_suggest_detached_tasks_total", "outcome" => "failed")
                .increment(1);
            error!(task = name, error = %e, "Detached task failure");
        }
    }
}

/// Spawns each task onto the current tokio runtime
#[derive(Debug, Default, Clone)]
pub struct TokioTaskSubmitter;

impl TaskSubmitter for TokioTaskSubmitter {
    fn submit(&self, name: &'static str, task: DetachedTask) {
        let span = tracing::info_span!("detached_task", task = name);
        tokio::spawn(run_detached(name, task).instrument(span));
    }
}

/// Queues tasks until `run_all` is awaited
#[derive(Default)]
pub struct DeferredTaskSubmitter {
    pending: Mutex<Vec<(&'static str, DetachedTask)>>,
}

impl DeferredTaskSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Names of the tasks waiting to run, in submission order
    pub fn pending_names(&self) -> Vec<&'static str> {
        self.pending
            .lock()
            .map(|p| p.iter().map(|(name, _)| *name).collect())
            .unwrap_or_default()
    }

    /// Run every queued task in submission order; failures are logged only
    pub async fn run_all(&self) -> Result<usize> {
        let tasks = {
            let mut pending = self.pending.lock().map_err(|_| AppError::Internal {
                message: "task queue lock poisoned".to_string(),
            })?;
            std::mem::take(&mut *pending)
        };

        let count = tasks.len();
        for (name, task) in tasks {
            run_detached(name, task).await;
        }
        Ok(count)
    }
}

impl TaskSubmitter for DeferredTaskSubmitter {
    fn submit(&self, name: &'static str, task: DetachedTask) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push((name, task));
        }
    }
}
