//! Command inputs and results.

use warden_policy::SanctionDirective;
use warden_types::{
    Identity, NewSanction, RestrictionRecord, SanctionCategory, SanctionCounts, ScopeId,
};

/// Who is acting on whom, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanctionContext {
    pub scope: ScopeId,
    pub target: Identity,
    pub actor: Identity,
}

impl SanctionContext {
    pub fn new(scope: impl Into<ScopeId>, target: Identity, actor: Identity) -> Self {
        Self {
            scope: scope.into(),
            target,
            actor,
        }
    }

    /// An `add` event against the target, attributed to the actor.
    pub fn add(&self, category: SanctionCategory, reason: impl Into<String>) -> NewSanction {
        NewSanction::add(
            category,
            self.target.clone(),
            self.scope,
            reason,
            self.actor.clone(),
        )
    }

    pub fn remove(&self, category: SanctionCategory, reason: impl Into<String>) -> NewSanction {
        NewSanction::remove(
            category,
            self.target.clone(),
            self.scope,
            reason,
            self.actor.clone(),
        )
    }
}

/// One step of an escalation cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedEscalation {
    Restricted {
        record: RestrictionRecord,
        counted: bool,
    },
    Removed {
        reason: String,
    },
    Banned {
        reason: String,
    },
    /// The member was already restricted; the chain stopped here.
    Skipped { directive: SanctionDirective },
    /// The platform refused the step; the chain stopped here.
    Failed {
        directive: SanctionDirective,
        error: String,
    },
}

impl AppliedEscalation {
    /// Whether the step took effect, letting the chain continue.
    pub fn took_effect(&self) -> bool {
        matches!(
            self,
            Self::Restricted { .. } | Self::Removed { .. } | Self::Banned { .. }
        )
    }
}

/// Result of a sanction command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Counts after the command and any cascade.
    pub counts: SanctionCounts,

    /// Cascade steps, in the order they ran.
    pub escalations: Vec<AppliedEscalation>,

    /// Restriction placed directly by the command, if any.
    pub restriction: Option<RestrictionRecord>,
}

impl CommandOutcome {
    pub fn new(counts: SanctionCounts) -> Self {
        Self {
            counts,
            escalations: Vec::new(),
            restriction: None,
        }
    }

    pub fn escalated(&self) -> bool {
        self.escalations.iter().any(AppliedEscalation::took_effect)
    }
}
