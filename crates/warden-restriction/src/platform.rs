//! Boundary to the chat platform's permission system.

use async_trait::async_trait;
use thiserror::Error;
use warden_types::{MemberId, RoleId, ScopeId};

/// Failures reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    /// Whether the error belongs to the "not found" family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MemberNotFound(_) | Self::RoleNotFound(_))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Permission operations the engine needs from the platform.
///
/// Authorization of the invoking moderator happens before any of these are
/// called.
#[async_trait]
pub trait PlatformPermissions: Send + Sync {
    /// Roles the member currently holds in the scope, including the
    /// scope's base role.
    async fn current_roles(&self, member: MemberId, scope: ScopeId) -> PlatformResult<Vec<RoleId>>;

    async fn grant_role(&self, member: MemberId, scope: ScopeId, role: RoleId)
        -> PlatformResult<()>;

    async fn revoke_role(&self, member: MemberId, scope: ScopeId, role: RoleId)
        -> PlatformResult<()>;

    /// Eject the member without a persistent block.
    async fn kick(&self, member: MemberId, scope: ScopeId, reason: &str) -> PlatformResult<()>;

    async fn ban(&self, member: MemberId, scope: ScopeId, reason: &str) -> PlatformResult<()>;

    async fn unban(&self, member: MemberId, scope: ScopeId) -> PlatformResult<()>;
}
