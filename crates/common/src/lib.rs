//! Recipe Suggest Common Library
//!
//! Shared code for the gateway and the enrichment worker including:
//! - Prompt construction and the generative client abstraction
//! - Structured extraction of JSON from model output
//! - Ingredient reconciliation against a stock list
//! - Document store, CMS, image and detached-task collaborators
//! - Blog publishing fan-out
//! - Error types, configuration, models and metrics

pub mod cms;
pub mod config;
pub mod errors;
pub mod extract;
pub mod generative;
pub mod images;
pub mod metrics;
pub mod models;
pub mod prompt;
pub mod publish;
pub mod reconcile;
pub mod store;
pub mod tasks;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use extract::StructuredExtractor;
pub use generative::TextGenerator;
pub use prompt::PromptKind;
pub use reconcile::IngredientReconciler;
pub use store::DocumentStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
