//! Error types for restriction management.

use thiserror::Error;
use warden_storage::StorageError;
use warden_types::RestrictionKey;

use crate::PlatformError;

/// Errors from the restriction manager.
#[derive(Debug, Error)]
pub enum RestrictionError {
    #[error("{0} is already restricted")]
    AlreadyRestricted(RestrictionKey),

    #[error("{0} is not restricted")]
    NotRestricted(RestrictionKey),

    #[error("restriction duration must be positive")]
    ZeroDuration,

    #[error("restriction expiry is out of range")]
    ExpiryOutOfRange,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type RestrictionResult<T> = Result<T, RestrictionError>;
