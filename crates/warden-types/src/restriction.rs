//! Live restriction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MemberId, RoleId, ScopeId};

/// At most one live restriction exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RestrictionKey {
    pub member: MemberId,
    pub scope: ScopeId,
}

impl RestrictionKey {
    pub fn new(member: MemberId, scope: ScopeId) -> Self {
        Self { member, scope }
    }
}

impl std::fmt::Display for RestrictionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.member, self.scope)
    }
}

/// Durable record of a restriction currently in force.
///
/// `prior_roles` is captured once, before anything is stripped, and is
/// replayed verbatim when the restriction is lifted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionRecord {
    pub member: MemberId,
    pub scope: ScopeId,
    pub reason: String,
    pub applied_by: MemberId,
    pub applied_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub prior_roles: Vec<RoleId>,
}

impl RestrictionRecord {
    pub fn key(&self) -> RestrictionKey {
        RestrictionKey::new(self.member, self.scope)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left until expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}
