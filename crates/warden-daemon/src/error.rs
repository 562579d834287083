//! Error types for warden-daemon

use thiserror::Error;
use warden_service::ModerationError;
use warden_storage::StorageError;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Moderation engine error
    #[error("Moderation error: {0}")]
    Moderation(#[from] ModerationError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
