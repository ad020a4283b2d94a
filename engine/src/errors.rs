//! Error types for the CAPA engine

use thiserror::Error;

/// Main error type for the CAPA engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow already initiated: {0}")]
    AlreadyInitiated(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
