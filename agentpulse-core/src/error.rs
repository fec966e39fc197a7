//! Error types for agentpulse-core

use thiserror::Error;

/// Main error type for the agentpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error for a registry or persisted state
    #[error("parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Publisher/tick loop error
    #[error("publish error: {0}")]
    Publish(String),
}

/// Result type alias for agentpulse-core
pub type Result<T> = std::result::Result<T, Error>;
