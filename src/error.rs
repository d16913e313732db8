//! Error types for testcompose

use thiserror::Error;

/// Result type for testcompose operations
pub type Result<T> = std::result::Result<T, ComposeError>;

/// testcompose error types
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Compose file validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout reached while waiting on service: {0}")]
    TimeoutExceeded(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ComposeError {
    /// Service addressed by a builder operation is not defined
    pub(crate) fn service_not_found(name: &str) -> Self {
        ComposeError::KeyNotFound(format!("service '{}'", name))
    }
}
