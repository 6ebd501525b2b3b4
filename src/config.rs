//! Configuration management for Ideascope
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{IdeascopeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::Cli;

/// Environment variable holding the AI provider key
///
/// The key is the single server-side secret: it is read only by the
/// assistant API service and never written to the config file.
pub const PROVIDER_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable overriding the history database path
pub const HISTORY_DB_ENV: &str = "IDEASCOPE_HISTORY_DB";

/// Main configuration structure for Ideascope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ranked-result service settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Assistant API service settings (client side)
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// AI provider settings used by `ideascope serve`
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chat-history storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Ranked-result service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the ranked-result service
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// How many ranked results to request per query
    ///
    /// The chat UI offers 5/10/15/20; any value in 1..=50 is accepted.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_search_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_result_count() -> u32 {
    5
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            result_count: default_result_count(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Assistant API service configuration (as seen by the chat client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Base URL of the assistant API service
    #[serde(default = "default_assistant_endpoint")]
    pub endpoint: String,

    /// Query mode: "raw" sends the user text as-is, "enhanced" rewrites it
    /// through the enhancement endpoint first
    #[serde(default = "default_query_mode")]
    pub query_mode: String,
}

fn default_assistant_endpoint() -> String {
    "http://localhost:3310".to_string()
}

fn default_query_mode() -> String {
    "raw".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_assistant_endpoint(),
            query_mode: default_query_mode(),
        }
    }
}

/// AI provider configuration for the server side
///
/// The API key itself comes only from [`PROVIDER_KEY_ENV`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the Gemini-compatible API
    ///
    /// Overridable so tests can point the generator at a mock server.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model used for summarization
    #[serde(default = "default_model")]
    pub model: String,

    /// Optional cheaper model for query enhancement
    #[serde(default)]
    pub enhance_model: Option<String>,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            enhance_model: None,
        }
    }
}

/// Chat-history storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Optional database path override
    ///
    /// When unset the database lives in the user data directory. The
    /// [`HISTORY_DB_ENV`] environment variable takes precedence over both.
    #[serde(default)]
    pub path: Option<String>,

    /// Retention window in days; chats older than this are purged
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            retention_days: default_retention_days(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, applying CLI overrides
    ///
    /// A missing file is not an error: defaults apply, so the binary works
    /// out of the box against local services.
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| IdeascopeError::Config(format!("failed to read {path}: {e}")))?;
            serde_yaml::from_str(&contents)
                .map_err(|e| IdeascopeError::Config(format!("failed to parse {path}: {e}")))?
        } else {
            tracing::debug!("config file {} not found, using defaults", path);
            Self::default()
        };

        if let Some(storage_path) = &cli.storage_path {
            config.storage.path = Some(storage_path.clone());
        }

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `IdeascopeError::Config` when an endpoint is malformed, the
    /// result count is outside 1..=50, the query mode is unknown, or the
    /// retention window is not positive.
    pub fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("search.endpoint", &self.search.endpoint),
            ("assistant.endpoint", &self.assistant.endpoint),
            ("provider.api_base", &self.provider.api_base),
        ] {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(IdeascopeError::Config(format!(
                    "{name} must be an http(s) URL, got '{endpoint}'"
                ))
                .into());
            }
        }

        if self.search.result_count == 0 || self.search.result_count > 50 {
            return Err(IdeascopeError::Config(format!(
                "search.result_count must be in 1..=50, got {}",
                self.search.result_count
            ))
            .into());
        }

        if !matches!(self.assistant.query_mode.as_str(), "raw" | "enhanced") {
            return Err(IdeascopeError::Config(format!(
                "assistant.query_mode must be 'raw' or 'enhanced', got '{}'",
                self.assistant.query_mode
            ))
            .into());
        }

        if self.storage.retention_days <= 0 {
            return Err(IdeascopeError::Config(format!(
                "storage.retention_days must be positive, got {}",
                self.storage.retention_days
            ))
            .into());
        }

        Ok(())
    }

    /// Provider API key from the environment, if configured
    pub fn provider_key() -> Option<String> {
        std::env::var(PROVIDER_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
