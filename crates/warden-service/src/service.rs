//! Moderation commands.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use warden_ledger::{EscalationLedger, HistoryPage};
use warden_policy::{EscalationPolicy, EscalationTier, PolicyConfig, SanctionDirective};
use warden_restriction::{
    PlatformPermissions, ReconcileReport, RestrictionConfig, RestrictionError, RestrictionEvent,
    RestrictionRequest, TimedRestrictionManager,
};
use warden_storage::{ModerationStorage, RestrictionStore, SanctionEventStore};
use warden_types::{
    parse_duration, Clock, LogKind, MemberId, NewSanction, RestrictionRecord, SanctionCategory,
    SanctionCounts, SanctionEvent, ScopeId,
};

use crate::{AppliedEscalation, CommandOutcome, ModerationError, ModerationResult, SanctionContext};

/// Facade over ledger, policy, restriction manager and platform.
pub struct ModerationService {
    ledger: EscalationLedger,
    policy: EscalationPolicy,
    restrictions: TimedRestrictionManager,
    platform: Arc<dyn PlatformPermissions>,
}

impl ModerationService {
    /// Build a service over one storage backend.
    pub fn new<S>(
        storage: Arc<S>,
        platform: Arc<dyn PlatformPermissions>,
        policy: PolicyConfig,
        restriction: RestrictionConfig,
        clock: Arc<dyn Clock>,
    ) -> ModerationResult<Self>
    where
        S: ModerationStorage + 'static,
    {
        restriction.validate()?;
        let policy = EscalationPolicy::new(policy)?;

        let events: Arc<dyn SanctionEventStore> = storage.clone();
        let records: Arc<dyn RestrictionStore> = storage;

        Ok(Self {
            ledger: EscalationLedger::with_clock(events, clock.clone()),
            policy,
            restrictions: TimedRestrictionManager::new(
                restriction,
                records,
                platform.clone(),
                clock,
            ),
            platform,
        })
    }

    pub fn restrictions(&self) -> &TimedRestrictionManager {
        &self.restrictions
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Subscribe to restriction lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RestrictionEvent> {
        self.restrictions.subscribe()
    }

    /// Record a warning and run the cascade from the warning tier.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn warn(&self, ctx: &SanctionContext, reason: &str) -> ModerationResult<CommandOutcome> {
        self.record(ctx.add(SanctionCategory::Warning, reason)).await?;

        let mut outcome = CommandOutcome::new(SanctionCounts::default());
        outcome.counts = self
            .cascade(ctx, EscalationTier::Warning, &mut outcome.escalations)
            .await?;

        info!(warnings = outcome.counts.warnings, escalated = outcome.escalated(), "Warning issued");
        Ok(outcome)
    }

    /// Withdraw one warning. Fails with `NoWarnings` when none are active.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn remove_warning(
        &self,
        ctx: &SanctionContext,
        reason: &str,
    ) -> ModerationResult<CommandOutcome> {
        let counts = self.ledger.counts(ctx.target.id, ctx.scope).await?;
        if counts.warnings == 0 {
            return Err(ModerationError::NoWarnings(ctx.target.id));
        }

        self.record(ctx.remove(SanctionCategory::Warning, format!("경고 삭제: {reason}"))).await?;

        let counts = self.ledger.counts(ctx.target.id, ctx.scope).await?;
        info!(warnings = counts.warnings, "Warning removed");
        Ok(CommandOutcome::new(counts))
    }

    /// Restrict for a moderator-entered duration such as `2h30m`.
    ///
    /// The restriction counts toward the restriction tier, which is
    /// evaluated afterwards.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn restrict(
        &self,
        ctx: &SanctionContext,
        duration: &str,
        reason: &str,
    ) -> ModerationResult<CommandOutcome> {
        let duration = parse_duration(duration)?;
        let record = self
            .restrictions
            .apply(self.request(ctx, duration, reason))
            .await?;
        self.record_restriction(ctx, &record, true).await?;

        let mut outcome = CommandOutcome::new(SanctionCounts::default());
        outcome.counts = self
            .cascade(ctx, EscalationTier::Restriction, &mut outcome.escalations)
            .await?;
        outcome.restriction = Some(record);
        Ok(outcome)
    }

    /// Warn and restrict in one step.
    ///
    /// If the warning crosses the warning threshold, the threshold
    /// restriction replaces the requested one and the cascade continues
    /// from there. Otherwise the requested restriction is applied first,
    /// so a refusal leaves no warning behind, and does not count toward
    /// the restriction tier.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn warn_and_restrict(
        &self,
        ctx: &SanctionContext,
        duration: &str,
        reason: &str,
    ) -> ModerationResult<CommandOutcome> {
        let duration = parse_duration(duration)?;
        let warning = ctx.add(SanctionCategory::Warning, format!("경고재갈: {reason}"));

        let mut projected = self.ledger.counts(ctx.target.id, ctx.scope).await?;
        projected.warnings = projected.warnings.saturating_add(1);

        if self
            .policy
            .next_action(EscalationTier::Warning, &projected)
            .is_some()
        {
            if self
                .restrictions
                .is_restricted(ctx.target.id, ctx.scope)
                .await?
            {
                return Err(ModerationError::AlreadyRestricted(ctx.target.id));
            }
            self.record(warning).await?;

            let mut outcome = CommandOutcome::new(SanctionCounts::default());
            outcome.counts = self
                .cascade(ctx, EscalationTier::Warning, &mut outcome.escalations)
                .await?;
            return Ok(outcome);
        }

        // The manager checks for an existing restriction under its key lock.
        let record = self
            .restrictions
            .apply(self.request(ctx, duration, reason))
            .await?;
        if let Err(e) = self.record(warning).await {
            error!(key = %record.key(), error = %e, "Restriction applied but warning not logged");
            return Err(e);
        }
        self.record_restriction(ctx, &record, false).await?;

        let mut outcome = CommandOutcome::new(self.ledger.counts(ctx.target.id, ctx.scope).await?);
        outcome.restriction = Some(record);
        Ok(outcome)
    }

    /// Lift a restriction early.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn unrestrict(
        &self,
        ctx: &SanctionContext,
        reason: &str,
    ) -> ModerationResult<CommandOutcome> {
        let record = self.restrictions.reverse(ctx.target.id, ctx.scope).await?;

        self.record(ctx.add(SanctionCategory::Unrestriction, format!("뮤트 해제: {reason}"))).await?;

        let mut outcome = CommandOutcome::new(self.ledger.counts(ctx.target.id, ctx.scope).await?);
        outcome.restriction = Some(record);
        Ok(outcome)
    }

    /// Remove the member from the scope and run the removal tier.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn kick(&self, ctx: &SanctionContext, reason: &str) -> ModerationResult<CommandOutcome> {
        self.platform.kick(ctx.target.id, ctx.scope, reason).await?;
        self.record(ctx.add(SanctionCategory::Removal, reason)).await?;

        let mut outcome = CommandOutcome::new(SanctionCounts::default());
        outcome.counts = self
            .cascade(ctx, EscalationTier::Removal, &mut outcome.escalations)
            .await?;
        Ok(outcome)
    }

    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn ban(&self, ctx: &SanctionContext, reason: &str) -> ModerationResult<CommandOutcome> {
        self.platform.ban(ctx.target.id, ctx.scope, reason).await?;
        self.record(ctx.add(SanctionCategory::Ban, reason)).await?;

        Ok(CommandOutcome::new(
            self.ledger.counts(ctx.target.id, ctx.scope).await?,
        ))
    }

    /// Lift a ban. The ban count is unaffected.
    #[instrument(skip(self, ctx, reason), fields(member_id = %ctx.target.id, scope_id = %ctx.scope))]
    pub async fn unban(&self, ctx: &SanctionContext, reason: &str) -> ModerationResult<CommandOutcome> {
        self.platform.unban(ctx.target.id, ctx.scope).await?;
        self.record(ctx.remove(SanctionCategory::Ban, format!("사면: {reason}"))).await?;

        Ok(CommandOutcome::new(
            self.ledger.counts(ctx.target.id, ctx.scope).await?,
        ))
    }

    pub async fn counts(&self, member: MemberId, scope: ScopeId) -> ModerationResult<SanctionCounts> {
        Ok(self.ledger.counts(member, scope).await?)
    }

    pub async fn history(
        &self,
        member: MemberId,
        scope: ScopeId,
        kind: LogKind,
    ) -> ModerationResult<Vec<SanctionEvent>> {
        Ok(self.ledger.history(member, scope, kind).await?)
    }

    pub async fn history_page(
        &self,
        member: MemberId,
        scope: ScopeId,
        kind: LogKind,
        page: usize,
    ) -> ModerationResult<HistoryPage> {
        Ok(self.ledger.history_page(member, scope, kind, page).await?)
    }

    pub async fn reconcile_on_startup(&self) -> ModerationResult<ReconcileReport> {
        Ok(self.restrictions.reconcile_on_startup().await?)
    }

    /// Evaluate tiers left to right starting at `start`, each at most once.
    ///
    /// Counts are re-read from the ledger after every applied directive.
    async fn cascade(
        &self,
        ctx: &SanctionContext,
        start: EscalationTier,
        escalations: &mut Vec<AppliedEscalation>,
    ) -> ModerationResult<SanctionCounts> {
        let mut counts = self.ledger.counts(ctx.target.id, ctx.scope).await?;
        let mut tier = Some(start);

        while let Some(current) = tier {
            let Some(directive) = self.policy.next_action(current, &counts) else {
                break;
            };

            info!(tier = ?current, reason = directive.reason(), "Escalation threshold reached");
            let step = self.execute(ctx, &directive).await?;
            let took_effect = step.took_effect();
            escalations.push(step);
            if !took_effect {
                break;
            }

            counts = self.ledger.counts(ctx.target.id, ctx.scope).await?;
            tier = directive.next_tier();
        }

        Ok(counts)
    }

    /// Carry out one directive. Platform refusals and an existing
    /// restriction end the chain without failing the command; store
    /// failures propagate.
    async fn execute(
        &self,
        ctx: &SanctionContext,
        directive: &SanctionDirective,
    ) -> ModerationResult<AppliedEscalation> {
        match directive {
            SanctionDirective::Restrict {
                duration,
                reason,
                counted,
            } => match self
                .restrictions
                .apply(self.request(ctx, *duration, reason))
                .await
            {
                Ok(record) => {
                    self.record_restriction(ctx, &record, *counted).await?;
                    Ok(AppliedEscalation::Restricted {
                        record,
                        counted: *counted,
                    })
                }
                Err(RestrictionError::AlreadyRestricted(_)) => Ok(AppliedEscalation::Skipped {
                    directive: directive.clone(),
                }),
                Err(RestrictionError::Platform(e)) => {
                    warn!(error = %e, "Escalation restriction refused by platform");
                    Ok(AppliedEscalation::Failed {
                        directive: directive.clone(),
                        error: e.to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            },
            SanctionDirective::Remove { reason } => {
                if let Err(e) = self.platform.kick(ctx.target.id, ctx.scope, reason).await {
                    warn!(error = %e, "Escalation removal refused by platform");
                    return Ok(AppliedEscalation::Failed {
                        directive: directive.clone(),
                        error: e.to_string(),
                    });
                }
                self.record(ctx.add(SanctionCategory::Removal, reason.as_str())).await?;
                Ok(AppliedEscalation::Removed {
                    reason: reason.clone(),
                })
            }
            SanctionDirective::Ban { reason } => {
                if let Err(e) = self.platform.ban(ctx.target.id, ctx.scope, reason).await {
                    warn!(error = %e, "Escalation ban refused by platform");
                    return Ok(AppliedEscalation::Failed {
                        directive: directive.clone(),
                        error: e.to_string(),
                    });
                }
                self.record(ctx.add(SanctionCategory::Ban, reason.as_str())).await?;
                Ok(AppliedEscalation::Banned {
                    reason: reason.clone(),
                })
            }
        }
    }

    fn request(
        &self,
        ctx: &SanctionContext,
        duration: std::time::Duration,
        reason: &str,
    ) -> RestrictionRequest {
        RestrictionRequest {
            member: ctx.target.id,
            scope: ctx.scope,
            reason: reason.to_string(),
            duration,
            actor: ctx.actor.id,
        }
    }

    async fn record_restriction(
        &self,
        ctx: &SanctionContext,
        record: &RestrictionRecord,
        counted: bool,
    ) -> ModerationResult<()> {
        let mut sanction = ctx
            .add(SanctionCategory::Restriction, record.reason.as_str())
            .with_expiry(record.expires_at);
        if !counted {
            sanction = sanction.uncounted();
        }
        if let Err(e) = self.record(sanction).await {
            error!(
                key = %record.key(),
                expires_at = %record.expires_at,
                error = %e,
                "Restriction applied but not logged in the sanction history"
            );
            return Err(e);
        }
        Ok(())
    }

    async fn record(&self, sanction: NewSanction) -> ModerationResult<SanctionEvent> {
        Ok(self.ledger.record_event(sanction).await?)
    }
}
