//! Command-level error taxonomy.

use thiserror::Error;
use warden_ledger::LedgerError;
use warden_policy::PolicyError;
use warden_restriction::{PlatformError, RestrictionError};
use warden_storage::StorageError;
use warden_types::{DurationParseError, MemberId};

/// Errors surfaced to the command layer.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("invalid duration: {0}")]
    InvalidDuration(#[from] DurationParseError),

    #[error("member {0} is already restricted")]
    AlreadyRestricted(MemberId),

    #[error("member {0} is not restricted")]
    NotRestricted(MemberId),

    #[error("member {0} has no warnings")]
    NoWarnings(MemberId),

    #[error("platform refused: {0}")]
    PlatformForbidden(String),

    #[error("platform target not found: {0}")]
    PlatformNotFound(String),

    #[error("platform unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ModerationError {
    /// Text shown to the moderator who ran the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidDuration(e) => e.usage_hint().to_string(),
            Self::AlreadyRestricted(_) => "이미 재갈 상태입니다.".to_string(),
            Self::NotRestricted(_) => "재갈 상태가 아닙니다.".to_string(),
            Self::NoWarnings(_) => "경고가 없습니다.".to_string(),
            Self::PlatformForbidden(_) => "권한이 부족하여 처리할 수 없습니다.".to_string(),
            Self::PlatformNotFound(_) => "대상을 찾을 수 없습니다.".to_string(),
            Self::PlatformUnavailable(detail)
            | Self::StoreUnavailable(detail)
            | Self::Configuration(detail) => {
                format!("명령어 실행 중 오류가 발생했습니다: {detail}")
            }
        }
    }

    /// Whether the command was a no-op rather than a failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRestricted(_) | Self::NotRestricted(_) | Self::NoWarnings(_)
        )
    }
}

impl From<PlatformError> for ModerationError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::Forbidden(detail) => Self::PlatformForbidden(detail),
            e @ (PlatformError::MemberNotFound(_) | PlatformError::RoleNotFound(_)) => {
                Self::PlatformNotFound(e.to_string())
            }
            PlatformError::Unavailable(detail) => Self::PlatformUnavailable(detail),
        }
    }
}

impl From<StorageError> for ModerationError {
    fn from(error: StorageError) -> Self {
        Self::StoreUnavailable(error.to_string())
    }
}

impl From<LedgerError> for ModerationError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::Storage(e) => e.into(),
        }
    }
}

impl From<PolicyError> for ModerationError {
    fn from(error: PolicyError) -> Self {
        Self::Configuration(error.to_string())
    }
}

impl From<RestrictionError> for ModerationError {
    fn from(error: RestrictionError) -> Self {
        match error {
            RestrictionError::AlreadyRestricted(key) => Self::AlreadyRestricted(key.member),
            RestrictionError::NotRestricted(key) => Self::NotRestricted(key.member),
            RestrictionError::ZeroDuration => Self::InvalidDuration(DurationParseError::Zero),
            RestrictionError::ExpiryOutOfRange => {
                Self::InvalidDuration(DurationParseError::Overflow)
            }
            RestrictionError::InvalidConfig(detail) => Self::Configuration(detail),
            RestrictionError::Platform(e) => e.into(),
            RestrictionError::Storage(e) => e.into(),
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::RestrictionKey;

    #[test]
    fn test_platform_errors_map_to_taxonomy() {
        assert!(matches!(
            ModerationError::from(PlatformError::Forbidden("hierarchy".into())),
            ModerationError::PlatformForbidden(_)
        ));
        assert!(matches!(
            ModerationError::from(PlatformError::MemberNotFound(MemberId::new(1))),
            ModerationError::PlatformNotFound(_)
        ));
    }

    #[test]
    fn test_restriction_errors_keep_member() {
        let key = RestrictionKey::new(MemberId::new(5), warden_types::ScopeId::new(9));
        let err = ModerationError::from(RestrictionError::AlreadyRestricted(key));
        assert!(matches!(err, ModerationError::AlreadyRestricted(m) if m == MemberId::new(5)));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_invalid_duration_shows_usage() {
        let err = ModerationError::from(DurationParseError::MissingUnit);
        assert_eq!(
            err.user_message(),
            "재갈 시간 형식이 올바르지 않습니다. 예: 1h30m, 2d, 45m"
        );
    }

    #[test]
    fn test_store_failure_is_reported_not_hidden() {
        let err = ModerationError::from(StorageError::Backend("connection reset".into()));
        assert!(err.user_message().contains("connection reset"));
        assert!(!err.is_precondition());
    }
}
