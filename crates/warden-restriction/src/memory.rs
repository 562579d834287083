//! In-process platform used by tests and the daemon's dry-run mode.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use warden_types::{MemberId, RestrictionKey, RoleId, ScopeId};

use crate::{PlatformError, PlatformPermissions, PlatformResult};

/// Kinds of platform operation, used for failure injection and journal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOpKind {
    CurrentRoles,
    GrantRole,
    RevokeRole,
    Kick,
    Ban,
    Unban,
}

/// A successful mutating operation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
    GrantRole {
        member: MemberId,
        scope: ScopeId,
        role: RoleId,
    },
    RevokeRole {
        member: MemberId,
        scope: ScopeId,
        role: RoleId,
    },
    Kick {
        member: MemberId,
        scope: ScopeId,
        reason: String,
    },
    Ban {
        member: MemberId,
        scope: ScopeId,
        reason: String,
    },
    Unban {
        member: MemberId,
        scope: ScopeId,
    },
}

impl PlatformOp {
    pub fn kind(&self) -> PlatformOpKind {
        match self {
            Self::GrantRole { .. } => PlatformOpKind::GrantRole,
            Self::RevokeRole { .. } => PlatformOpKind::RevokeRole,
            Self::Kick { .. } => PlatformOpKind::Kick,
            Self::Ban { .. } => PlatformOpKind::Ban,
            Self::Unban { .. } => PlatformOpKind::Unban,
        }
    }
}

struct FailureRule {
    kind: PlatformOpKind,
    role: Option<RoleId>,
    error: PlatformError,
}

#[derive(Default)]
struct PlatformState {
    roles: HashSet<(ScopeId, RoleId)>,
    members: HashMap<RestrictionKey, BTreeSet<RoleId>>,
    bans: HashMap<RestrictionKey, String>,
    journal: Vec<PlatformOp>,
    failures: Vec<FailureRule>,
}

impl PlatformState {
    fn check_failure(&self, kind: PlatformOpKind, role: Option<RoleId>) -> PlatformResult<()> {
        let hit = self
            .failures
            .iter()
            .find(|rule| rule.kind == kind && (rule.role.is_none() || rule.role == role));
        match hit {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }

    fn role_exists(&self, scope: ScopeId, role: RoleId) -> bool {
        role == RoleId::everyone(scope) || self.roles.contains(&(scope, role))
    }

    fn member_roles(&mut self, key: RestrictionKey) -> PlatformResult<&mut BTreeSet<RoleId>> {
        self.members
            .get_mut(&key)
            .ok_or(PlatformError::MemberNotFound(key.member))
    }
}

/// A complete in-memory chat platform.
///
/// Tracks which roles exist per scope, which members hold which roles, and
/// bans. Every successful mutation is journaled. Failures can be injected
/// per operation kind, optionally narrowed to one role.
#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PlatformResult<MutexGuard<'_, PlatformState>> {
        self.state
            .lock()
            .map_err(|_| PlatformError::Unavailable("platform state poisoned".to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PlatformState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Create a role in a scope.
    pub fn create_role(&self, scope: ScopeId, role: RoleId) {
        self.with_state(|s| {
            s.roles.insert((scope, role));
        });
    }

    /// Delete a role from a scope, stripping it from every member there.
    pub fn delete_role(&self, scope: ScopeId, role: RoleId) {
        self.with_state(|s| {
            s.roles.remove(&(scope, role));
            for (key, roles) in s.members.iter_mut() {
                if key.scope == scope {
                    roles.remove(&role);
                }
            }
        });
    }

    /// Add a member holding `roles`. Unknown roles are created.
    pub fn join(&self, member: MemberId, scope: ScopeId, roles: impl IntoIterator<Item = RoleId>) {
        self.with_state(|s| {
            let roles = roles.into_iter().collect::<BTreeSet<_>>();
            for role in &roles {
                s.roles.insert((scope, *role));
            }
            s.members.insert(RestrictionKey::new(member, scope), roles);
        });
    }

    pub fn leave(&self, member: MemberId, scope: ScopeId) {
        self.with_state(|s| {
            s.members.remove(&RestrictionKey::new(member, scope));
        });
    }

    /// Roles held by a member, excluding the base role. `None` if absent.
    pub fn roles_of(&self, member: MemberId, scope: ScopeId) -> Option<BTreeSet<RoleId>> {
        self.with_state(|s| s.members.get(&RestrictionKey::new(member, scope)).cloned())
    }

    pub fn is_member(&self, member: MemberId, scope: ScopeId) -> bool {
        self.roles_of(member, scope).is_some()
    }

    pub fn is_banned(&self, member: MemberId, scope: ScopeId) -> bool {
        self.with_state(|s| s.bans.contains_key(&RestrictionKey::new(member, scope)))
    }

    /// Fail every operation of `kind` with `error` until cleared.
    pub fn fail(&self, kind: PlatformOpKind, error: PlatformError) {
        self.with_state(|s| {
            s.failures.push(FailureRule {
                kind,
                role: None,
                error,
            })
        });
    }

    /// Fail operations of `kind` that touch `role`.
    pub fn fail_role(&self, kind: PlatformOpKind, role: RoleId, error: PlatformError) {
        self.with_state(|s| {
            s.failures.push(FailureRule {
                kind,
                role: Some(role),
                error,
            })
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|s| s.failures.clear());
    }

    pub fn journal(&self) -> Vec<PlatformOp> {
        self.with_state(|s| s.journal.clone())
    }

    pub fn journal_count(&self, kind: PlatformOpKind) -> usize {
        self.with_state(|s| s.journal.iter().filter(|op| op.kind() == kind).count())
    }
}

#[async_trait]
impl PlatformPermissions for InMemoryPlatform {
    async fn current_roles(&self, member: MemberId, scope: ScopeId) -> PlatformResult<Vec<RoleId>> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::CurrentRoles, None)?;
        let held = state.member_roles(RestrictionKey::new(member, scope))?;

        let mut roles = vec![RoleId::everyone(scope)];
        roles.extend(held.iter().copied());
        Ok(roles)
    }

    async fn grant_role(
        &self,
        member: MemberId,
        scope: ScopeId,
        role: RoleId,
    ) -> PlatformResult<()> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::GrantRole, Some(role))?;
        if !state.role_exists(scope, role) {
            return Err(PlatformError::RoleNotFound(role));
        }
        state
            .member_roles(RestrictionKey::new(member, scope))?
            .insert(role);
        state.journal.push(PlatformOp::GrantRole {
            member,
            scope,
            role,
        });
        Ok(())
    }

    async fn revoke_role(
        &self,
        member: MemberId,
        scope: ScopeId,
        role: RoleId,
    ) -> PlatformResult<()> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::RevokeRole, Some(role))?;
        if !state.role_exists(scope, role) {
            return Err(PlatformError::RoleNotFound(role));
        }
        state
            .member_roles(RestrictionKey::new(member, scope))?
            .remove(&role);
        state.journal.push(PlatformOp::RevokeRole {
            member,
            scope,
            role,
        });
        Ok(())
    }

    async fn kick(&self, member: MemberId, scope: ScopeId, reason: &str) -> PlatformResult<()> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::Kick, None)?;
        if state
            .members
            .remove(&RestrictionKey::new(member, scope))
            .is_none()
        {
            return Err(PlatformError::MemberNotFound(member));
        }
        state.journal.push(PlatformOp::Kick {
            member,
            scope,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn ban(&self, member: MemberId, scope: ScopeId, reason: &str) -> PlatformResult<()> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::Ban, None)?;
        let key = RestrictionKey::new(member, scope);
        state.members.remove(&key);
        state.bans.insert(key, reason.to_string());
        state.journal.push(PlatformOp::Ban {
            member,
            scope,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn unban(&self, member: MemberId, scope: ScopeId) -> PlatformResult<()> {
        let mut state = self.lock()?;
        state.check_failure(PlatformOpKind::Unban, None)?;
        if state
            .bans
            .remove(&RestrictionKey::new(member, scope))
            .is_none()
        {
            return Err(PlatformError::MemberNotFound(member));
        }
        state.journal.push(PlatformOp::Unban { member, scope });
        Ok(())
    }
}
