//! Sanction events.
//!
//! The sanction log is append-only. An event is never edited or deleted;
//! lifting a warning or unbanning a member appends a new event with
//! [`SanctionAction::Remove`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, Identity, MemberId, ScopeId};

/// What kind of sanction an event concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionCategory {
    Warning,
    Restriction,
    Unrestriction,
    Removal,
    Ban,
}

impl SanctionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanctionCategory::Warning => "warning",
            SanctionCategory::Restriction => "restriction",
            SanctionCategory::Unrestriction => "unrestriction",
            SanctionCategory::Removal => "removal",
            SanctionCategory::Ban => "ban",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "warning" => Some(SanctionCategory::Warning),
            "restriction" => Some(SanctionCategory::Restriction),
            "unrestriction" => Some(SanctionCategory::Unrestriction),
            "removal" => Some(SanctionCategory::Removal),
            "ban" => Some(SanctionCategory::Ban),
            _ => None,
        }
    }
}

impl std::fmt::Display for SanctionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an event adds a sanction or annotates its removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionAction {
    Add,
    Remove,
}

impl SanctionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanctionAction::Add => "add",
            SanctionAction::Remove => "remove",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(SanctionAction::Add),
            "remove" => Some(SanctionAction::Remove),
            _ => None,
        }
    }
}

/// A sanction about to be appended. Identity, sequence and timestamp are
/// assigned when it is written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSanction {
    pub member: Identity,
    pub scope: ScopeId,
    pub category: SanctionCategory,
    pub action: SanctionAction,
    pub reason: String,
    pub actor: Identity,
    pub expires_at: Option<DateTime<Utc>>,
    /// False for restrictions that must not feed the restriction tier.
    pub counted: bool,
}

impl NewSanction {
    pub fn add(
        category: SanctionCategory,
        member: Identity,
        scope: ScopeId,
        reason: impl Into<String>,
        actor: Identity,
    ) -> Self {
        Self {
            member,
            scope,
            category,
            action: SanctionAction::Add,
            reason: reason.into(),
            actor,
            expires_at: None,
            counted: true,
        }
    }

    pub fn remove(
        category: SanctionCategory,
        member: Identity,
        scope: ScopeId,
        reason: impl Into<String>,
        actor: Identity,
    ) -> Self {
        Self {
            action: SanctionAction::Remove,
            ..Self::add(category, member, scope, reason, actor)
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn uncounted(mut self) -> Self {
        self.counted = false;
        self
    }
}

/// A stored, immutable sanction event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SanctionEvent {
    pub id: EventId,
    /// Store-assigned append position; breaks timestamp ties.
    pub sequence: u64,
    pub member: MemberId,
    pub member_name: String,
    pub scope: ScopeId,
    pub category: SanctionCategory,
    pub action: SanctionAction,
    pub reason: String,
    pub actor: MemberId,
    pub actor_name: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub counted: bool,
}

impl SanctionEvent {
    /// Materialise a draft into a stored event.
    pub fn from_draft(draft: NewSanction, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EventId::generate(),
            sequence,
            member: draft.member.id,
            member_name: draft.member.display_name,
            scope: draft.scope,
            category: draft.category,
            action: draft.action,
            reason: draft.reason,
            actor: draft.actor.id,
            actor_name: draft.actor.display_name,
            timestamp,
            expires_at: draft.expires_at,
            counted: draft.counted,
        }
    }

    /// Whether this event belongs in a history listing of `kind`.
    pub fn matches(&self, kind: LogKind) -> bool {
        match kind {
            LogKind::All => true,
            LogKind::Warning => self.category == SanctionCategory::Warning,
            LogKind::Restriction => matches!(
                self.category,
                SanctionCategory::Restriction | SanctionCategory::Unrestriction
            ),
            LogKind::Removal => self.category == SanctionCategory::Removal,
            LogKind::Ban => self.category == SanctionCategory::Ban,
        }
    }
}

/// Current per-category tallies for one member in one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionCounts {
    pub warnings: u32,
    pub restrictions: u32,
    pub removals: u32,
    pub bans: u32,
}

impl SanctionCounts {
    /// Tally for one category. Unrestriction events are never tallied.
    pub fn get(&self, category: SanctionCategory) -> u32 {
        match category {
            SanctionCategory::Warning => self.warnings,
            SanctionCategory::Restriction => self.restrictions,
            SanctionCategory::Removal => self.removals,
            SanctionCategory::Ban => self.bans,
            SanctionCategory::Unrestriction => 0,
        }
    }
}

/// History filter used by reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    #[default]
    All,
    Warning,
    /// Restrictions and their manual lifts.
    Restriction,
    Removal,
    /// Bans and unbans.
    Ban,
}
