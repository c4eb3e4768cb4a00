//! Error types for the Blacktree API core

use thiserror::Error;

/// Main error type for the Blacktree API core
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Broker channel is not connected: {0}")]
    NotConnected(String),

    #[error("Broker rejected the message: {0}")]
    PublishRejected(String),

    #[error("Broker error: {0}")]
    BrokerError(String),

    #[error("Malformed result message: {0}")]
    DecodeError(String),

    #[error("Unknown worker status: {0}")]
    UnknownStatus(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    TransientStorage(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::NotConnected(_) | ApiError::PublishRejected(_) | ApiError::TransientStorage(_)
        )
    }
}
