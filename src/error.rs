//! Error types for Ideascope
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Ideascope operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, search requests, assistant requests, and
/// chat-history storage operations.
#[derive(Error, Debug)]
pub enum IdeascopeError {
    /// Configuration-related errors (missing provider key, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected inputs and malformed request bodies
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ranked-result service errors (unreachable or non-2xx)
    ///
    /// Fatal for the turn that issued the search.
    #[error("Search error: {0}")]
    Search(String),

    /// Assistant service errors (enhancement or summarization)
    ///
    /// Always recoverable at the pipeline layer: enhancement falls back to
    /// the raw query, summarization falls back to a synthesized summary.
    #[error("Assistant error: {0}")]
    Assistant(String),

    /// Chat-history storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Ideascope operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
