//! Configuration management for Recipe Suggest services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reconcile::MatchingTables;

/// Lower bound for any generative call timeout, in seconds
pub const MIN_GENERATION_TIMEOUT_SECS: u64 = 30;

/// Upper bound for any generative call timeout, in seconds
pub const MAX_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Generative API configuration
    #[serde(default)]
    pub generative: GenerativeConfig,

    /// Document store configuration
    #[serde(default)]
    pub document_store: DocumentStoreConfig,

    /// Blog CMS configuration
    #[serde(default)]
    pub cms: CmsConfig,

    /// Image generation and storage configuration
    #[serde(default)]
    pub images: ImageConfig,

    /// Ingredient matching tables
    #[serde(default)]
    pub matching: MatchingTables,

    /// Ingredient reconciliation behaviour
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Request and diagnostic limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Custom API key header accepted by CORS preflight
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerativeConfig {
    /// Provider: gemini, mock
    #[serde(default = "default_generative_provider")]
    pub provider: String,

    /// Full generateContent endpoint for the model
    #[serde(default = "default_generative_url")]
    pub api_url: String,

    /// API key passed as the `key` query parameter
    pub api_key: Option<String>,

    /// Timeout for recipe generation in seconds
    #[serde(default = "default_recipe_timeout")]
    pub recipe_timeout_secs: u64,

    /// Timeout for ingredient enrichment in seconds
    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_secs: u64,

    /// Timeout for blog article generation in seconds
    #[serde(default = "default_blog_timeout")]
    pub blog_timeout_secs: u64,

    /// Timeout for assisted ingredient reconciliation in seconds
    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentStoreConfig {
    /// Provider: firestore, memory
    #[serde(default = "default_store_provider")]
    pub provider: String,

    /// Google Cloud project id
    pub project_id: Option<String>,

    /// Firestore database id
    #[serde(default = "default_database_id")]
    pub database_id: String,

    /// Firestore REST base URL
    #[serde(default = "default_firestore_url")]
    pub base_url: String,

    /// Bearer token supplied by the platform
    pub access_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Collection holding ingredient master entries
    #[serde(default = "default_ingredients_collection")]
    pub ingredients_collection: String,

    /// Collection holding recipes
    #[serde(default = "default_recipes_collection")]
    pub recipes_collection: String,

    /// Collection holding archived blog posts
    #[serde(default = "default_blog_collection")]
    pub blog_posts_collection: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CmsConfig {
    /// Post generated articles to the CMS
    #[serde(default)]
    pub enabled: bool,

    /// Post creation endpoint
    #[serde(default = "default_cms_endpoint")]
    pub endpoint: String,

    /// CMS user name
    pub user: Option<String>,

    /// CMS application password
    pub app_password: Option<String>,

    /// Status assigned to new posts
    #[serde(default = "default_post_status")]
    pub post_status: String,

    /// Request timeout in seconds
    #[serde(default = "default_cms_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Provider: vertex, none
    #[serde(default = "default_image_provider")]
    pub provider: String,

    /// Google Cloud project id used for Vertex AI
    pub project_id: Option<String>,

    /// Vertex AI location
    #[serde(default = "default_image_location")]
    pub location: String,

    /// Image model
    #[serde(default = "default_image_model")]
    pub model: String,

    /// Storage bucket receiving generated images
    pub bucket: Option<String>,

    /// Bearer token supplied by the platform
    pub access_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    /// Ask the generative API to confirm heuristic matches
    #[serde(default)]
    pub generative_assist: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Characters of upstream text kept in logs and error bodies
    #[serde(default = "default_preview_chars")]
    pub error_preview_chars: usize,

    /// Maximum entries accepted in any ingredient list
    #[serde(default = "default_max_ingredients")]
    pub max_ingredients: usize,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_api_key_header() -> String { "X-API-Key".to_string() }
fn default_generative_provider() -> String { "mock".to_string() }
fn default_generative_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent".to_string()
}
fn default_recipe_timeout() -> u64 { 60 }
fn default_enrichment_timeout() -> u64 { 30 }
fn default_blog_timeout() -> u64 { 120 }
fn default_reconcile_timeout() -> u64 { 30 }
fn default_store_provider() -> String { "memory".to_string() }
fn default_database_id() -> String { "(default)".to_string() }
fn default_firestore_url() -> String { "https://firestore.googleapis.com/v1".to_string() }
fn default_store_timeout() -> u64 { 30 }
fn default_ingredients_collection() -> String { "ingredients_master".to_string() }
fn default_recipes_collection() -> String { "recipes".to_string() }
fn default_blog_collection() -> String { "blog_posts".to_string() }
fn default_cms_endpoint() -> String { "http://localhost/wp-json/wp/v2/posts".to_string() }
fn default_post_status() -> String { "publish".to_string() }
fn default_cms_timeout() -> u64 { 30 }
fn default_image_provider() -> String { "none".to_string() }
fn default_image_location() -> String { "us-central1".to_string() }
fn default_image_model() -> String { "imagegeneration@006".to_string() }
fn default_image_timeout() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "recipe-suggest".to_string() }
fn default_preview_chars() -> usize { crate::errors::DEFAULT_PREVIEW_CHARS }
fn default_max_ingredients() -> usize { 100 }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__GENERATIVE__API_KEY=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific configuration file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl GenerativeConfig {
    pub fn recipe_timeout(&self) -> Duration {
        clamp_generation_timeout(self.recipe_timeout_secs)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        clamp_generation_timeout(self.enrichment_timeout_secs)
    }

    pub fn blog_timeout(&self) -> Duration {
        clamp_generation_timeout(self.blog_timeout_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        clamp_generation_timeout(self.reconcile_timeout_secs)
    }
}

fn clamp_generation_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_GENERATION_TIMEOUT_SECS, MAX_GENERATION_TIMEOUT_SECS))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            api_key_header: default_api_key_header(),
        }
    }
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: default_generative_provider(),
            api_url: default_generative_url(),
            api_key: None,
            recipe_timeout_secs: default_recipe_timeout(),
            enrichment_timeout_secs: default_enrichment_timeout(),
            blog_timeout_secs: default_blog_timeout(),
            reconcile_timeout_secs: default_reconcile_timeout(),
        }
    }
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_store_provider(),
            project_id: None,
            database_id: default_database_id(),
            base_url: default_firestore_url(),
            access_token: None,
            timeout_secs: default_store_timeout(),
            ingredients_collection: default_ingredients_collection(),
            recipes_collection: default_recipes_collection(),
            blog_posts_collection: default_blog_collection(),
        }
    }
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_cms_endpoint(),
            user: None,
            app_password: None,
            post_status: default_post_status(),
            timeout_secs: default_cms_timeout(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            project_id: None,
            location: default_image_location(),
            model: default_image_model(),
            bucket: None,
            access_token: None,
            timeout_secs: default_image_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            error_preview_chars: default_preview_chars(),
            max_ingredients: default_max_ingredients(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            generative: GenerativeConfig::default(),
            document_store: DocumentStoreConfig::default(),
            cms: CmsConfig::default(),
            images: ImageConfig::default(),
            matching: MatchingTables::default(),
            reconciliation: ReconciliationConfig::default(),
            observability: ObservabilityConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generative.provider, "mock");
        assert_eq!(config.document_store.ingredients_collection, "ingredients_master");
        assert!(!config.cms.enabled);
    }

    #[test]
    fn test_generation_timeouts_are_clamped() {
        let generative = GenerativeConfig {
            recipe_timeout_secs: 5,
            blog_timeout_secs: 600,
            ..GenerativeConfig::default()
        };
        assert_eq!(generative.recipe_timeout(), Duration::from_secs(30));
        assert_eq!(generative.blog_timeout(), Duration::from_secs(120));
        assert_eq!(generative.enrichment_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.document_store.database_id, "(default)");
        assert_eq!(config.limits.max_ingredients, 100);
    }
}
