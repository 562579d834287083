//! Timed Restriction Manager - apply, reverse and reconcile restrictions.
//!
//! Every operation on a (member, scope) key runs under that key's async
//! mutex, so a manual reversal and a firing timer never restore the same
//! snapshot twice. Operations on different keys proceed concurrently.
//!
//! Timers live in a per-manager registry. Each timer holds only a weak
//! reference to the manager and carries its own id; when it wakes it
//! reverses only if it is still the registered timer for its key. A
//! reversal that fails is retried with capped backoff for as long as the
//! record exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use warden_storage::RestrictionStore;
use warden_types::{Clock, MemberId, RestrictionKey, RestrictionRecord, RoleId, ScopeId};

use crate::{
    PlatformError, PlatformPermissions, RestrictionConfig, RestrictionError, RestrictionResult,
};

/// First retry delay after a failed timed reversal.
const RETRY_BASE: Duration = Duration::from_secs(30);

/// Upper bound for the retry delay.
const RETRY_MAX: Duration = Duration::from_secs(3600);

/// Parameters for applying a restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionRequest {
    pub member: MemberId,
    pub scope: ScopeId,
    pub reason: String,
    pub duration: Duration,
    pub actor: MemberId,
}

/// What triggered a reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalOrigin {
    /// An explicit moderator command.
    Manual,
    /// The in-process timer reached the expiry.
    Timer,
    /// Startup reconciliation found the record already expired.
    Reconcile,
}

/// Events emitted by the restriction manager.
#[derive(Debug, Clone)]
pub enum RestrictionEvent {
    /// Restriction applied and persisted.
    Applied {
        key: RestrictionKey,
        expires_at: DateTime<Utc>,
    },

    /// Restriction reversed and its record deleted.
    Reversed {
        key: RestrictionKey,
        origin: ReversalOrigin,
    },

    /// Reversal failed; the record was kept for a later retry.
    ReversalFailed {
        key: RestrictionKey,
        origin: ReversalOrigin,
        reason: String,
    },

    /// A reversal timer was armed.
    TimerArmed {
        key: RestrictionKey,
        expires_at: DateTime<Utc>,
    },
}

/// Outcome of startup reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Records already past expiry that were reversed.
    pub reversed: Vec<RestrictionKey>,

    /// Records still pending that got a fresh timer.
    pub rearmed: Vec<RestrictionKey>,

    /// Records that already had a live timer in this process.
    pub already_armed: Vec<RestrictionKey>,

    /// Records whose reversal failed, with the reason. They stay stored
    /// and get a retry timer.
    pub failed: Vec<(RestrictionKey, String)>,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.reversed.len() + self.rearmed.len() + self.already_armed.len() + self.failed.len()
    }

    pub fn requires_attention(&self) -> bool {
        !self.failed.is_empty()
    }
}

struct TimerEntry {
    id: u64,
    expires_at: DateTime<Utc>,
    /// Failed reversal attempts so far; zero for a regular expiry timer.
    attempt: u32,
    handle: JoinHandle<()>,
}

fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE
        .saturating_mul(1u32 << attempt.saturating_sub(1).min(7))
        .min(RETRY_MAX)
}

struct ManagerInner {
    config: RestrictionConfig,
    store: Arc<dyn RestrictionStore>,
    platform: Arc<dyn PlatformPermissions>,
    clock: Arc<dyn Clock>,

    /// Per-key serialization.
    key_locks: DashMap<RestrictionKey, Arc<Mutex<()>>>,

    /// Live reversal timers. Only mutated while holding the key's lock.
    timers: DashMap<RestrictionKey, TimerEntry>,

    next_timer_id: AtomicU64,
    event_tx: broadcast::Sender<RestrictionEvent>,
}

/// Orchestrates timed restrictions for any number of (member, scope) keys.
///
/// Cloning is cheap; clones share the same timers and locks. Independent
/// instances share nothing.
#[derive(Clone)]
pub struct TimedRestrictionManager {
    inner: Arc<ManagerInner>,
}

impl TimedRestrictionManager {
    pub fn new(
        config: RestrictionConfig,
        store: Arc<dyn RestrictionStore>,
        platform: Arc<dyn PlatformPermissions>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                store,
                platform,
                clock,
                key_locks: DashMap::new(),
                timers: DashMap::new(),
                next_timer_id: AtomicU64::new(1),
                event_tx,
            }),
        }
    }

    /// Subscribe to restriction events.
    pub fn subscribe(&self) -> broadcast::Receiver<RestrictionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn config(&self) -> &RestrictionConfig {
        &self.inner.config
    }

    /// Restrict a member: snapshot and strip roles, grant the marker,
    /// persist the record and arm the reversal timer.
    ///
    /// Nothing is persisted if any step fails; platform changes made so far
    /// are rolled back on a best-effort basis.
    #[instrument(skip(self, request), fields(member_id = %request.member, scope_id = %request.scope))]
    pub async fn apply(&self, request: RestrictionRequest) -> RestrictionResult<RestrictionRecord> {
        let key = RestrictionKey::new(request.member, request.scope);
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        if self.inner.store.get_restriction(&key).await?.is_some() {
            return Err(RestrictionError::AlreadyRestricted(key));
        }
        if request.duration.is_zero() {
            return Err(RestrictionError::ZeroDuration);
        }

        let applied_at = self.inner.clock.now();
        let expires_at = chrono::Duration::from_std(request.duration)
            .ok()
            .and_then(|d| applied_at.checked_add_signed(d))
            .ok_or(RestrictionError::ExpiryOutOfRange)?;

        let platform = &self.inner.platform;
        let marker = self.inner.config.marker_role;
        let base = RoleId::everyone(key.scope);

        let prior_roles = platform
            .current_roles(key.member, key.scope)
            .await?
            .into_iter()
            .filter(|role| *role != base && *role != marker)
            .collect::<Vec<_>>();

        let mut stripped = Vec::with_capacity(prior_roles.len());
        for role in &prior_roles {
            if let Err(e) = platform.revoke_role(key.member, key.scope, *role).await {
                warn!(role_id = %role, error = %e, "Failed to strip role, rolling back");
                self.rollback(key, &stripped, false).await;
                return Err(e.into());
            }
            stripped.push(*role);
        }

        if let Err(e) = platform.grant_role(key.member, key.scope, marker).await {
            warn!(error = %e, "Failed to grant restriction marker, rolling back");
            self.rollback(key, &stripped, false).await;
            return Err(e.into());
        }

        let record = RestrictionRecord {
            member: key.member,
            scope: key.scope,
            reason: request.reason,
            applied_by: request.actor,
            applied_at,
            expires_at,
            prior_roles,
        };

        if let Err(e) = self.inner.store.put_restriction(record.clone()).await {
            error!(error = %e, "Failed to persist restriction, rolling back");
            self.rollback(key, &stripped, true).await;
            return Err(if e.is_conflict() {
                RestrictionError::AlreadyRestricted(key)
            } else {
                e.into()
            });
        }

        self.arm_timer(key, expires_at);
        self.emit_event(RestrictionEvent::Applied { key, expires_at });

        info!(
            expires_at = %expires_at,
            snapshot_len = record.prior_roles.len(),
            "Restriction applied"
        );

        Ok(record)
    }

    /// Lift a restriction and restore the snapshotted roles.
    ///
    /// Fails with [`RestrictionError::NotRestricted`] when no record exists,
    /// which is also what a late duplicate reversal observes.
    #[instrument(skip(self), fields(member_id = %member, scope_id = %scope))]
    pub async fn reverse(
        &self,
        member: MemberId,
        scope: ScopeId,
    ) -> RestrictionResult<RestrictionRecord> {
        let key = RestrictionKey::new(member, scope);
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        self.reverse_locked(key, ReversalOrigin::Manual).await
    }

    /// Rebuild timers from the durable store.
    ///
    /// Expired records are reversed immediately, pending ones get a timer
    /// for the remaining time. A failing record is reported and retried
    /// in the background.
    #[instrument(skip(self))]
    pub async fn reconcile_on_startup(&self) -> RestrictionResult<ReconcileReport> {
        let records = self.inner.store.list_restrictions().await?;
        let mut report = ReconcileReport::default();

        info!(record_count = records.len(), "Starting restriction reconciliation");

        for record in records {
            let key = record.key();
            let lock = self.key_lock(key);
            let _guard = lock.lock().await;

            if self.inner.timers.contains_key(&key) {
                report.already_armed.push(key);
                continue;
            }

            let now = self.inner.clock.now();
            if !record.is_expired(now) {
                self.arm_timer(key, record.expires_at);
                report.rearmed.push(key);
                continue;
            }

            match self.reverse_locked(key, ReversalOrigin::Reconcile).await {
                Ok(_) => report.reversed.push(key),
                Err(RestrictionError::NotRestricted(_)) => {
                    debug!(key = %key, "Record vanished before reconciliation reached it");
                }
                Err(e) => {
                    self.arm_retry(key, record.expires_at, 1);
                    report.failed.push((key, e.to_string()));
                }
            }
        }

        info!(
            reversed = report.reversed.len(),
            rearmed = report.rearmed.len(),
            already_armed = report.already_armed.len(),
            failed = report.failed.len(),
            "Restriction reconciliation complete"
        );

        Ok(report)
    }

    pub async fn get(
        &self,
        member: MemberId,
        scope: ScopeId,
    ) -> RestrictionResult<Option<RestrictionRecord>> {
        Ok(self
            .inner
            .store
            .get_restriction(&RestrictionKey::new(member, scope))
            .await?)
    }

    pub async fn is_restricted(&self, member: MemberId, scope: ScopeId) -> RestrictionResult<bool> {
        Ok(self.get(member, scope).await?.is_some())
    }

    /// Keys with a live timer, sorted.
    pub fn armed_timers(&self) -> Vec<RestrictionKey> {
        let mut keys = self
            .inner
            .timers
            .iter()
            .map(|entry| *entry.key())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Expiry the live timer for `key` is waiting on.
    pub fn timer_deadline(&self, key: &RestrictionKey) -> Option<DateTime<Utc>> {
        self.inner.timers.get(key).map(|entry| entry.expires_at)
    }

    /// Abort every pending timer. Stored records are untouched.
    pub fn abort_timers(&self) {
        for entry in self.inner.timers.iter() {
            entry.value().handle.abort();
        }
        self.inner.timers.clear();
    }

    fn key_lock(&self, key: RestrictionKey) -> Arc<Mutex<()>> {
        self.inner
            .key_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reversal body. Caller holds the key lock.
    async fn reverse_locked(
        &self,
        key: RestrictionKey,
        origin: ReversalOrigin,
    ) -> RestrictionResult<RestrictionRecord> {
        let record = self
            .inner
            .store
            .get_restriction(&key)
            .await?
            .ok_or(RestrictionError::NotRestricted(key))?;

        if let Err(e) = self.restore(&record).await {
            warn!(key = %key, origin = ?origin, error = %e, "Reversal failed, record kept");
            self.emit_event(RestrictionEvent::ReversalFailed {
                key,
                origin,
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        self.inner.store.remove_restriction(&key).await?;
        self.cancel_timer(&key);
        self.emit_event(RestrictionEvent::Reversed { key, origin });

        // The caller's clone and the table's own are the only holders left.
        self.inner
            .key_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 2);

        info!(key = %key, origin = ?origin, "Restriction reversed");

        Ok(record)
    }

    /// Drop the marker and re-grant the snapshot. Roles deleted since the
    /// snapshot are skipped.
    async fn restore(&self, record: &RestrictionRecord) -> Result<(), PlatformError> {
        let platform = &self.inner.platform;
        let marker = self.inner.config.marker_role;

        match platform.revoke_role(record.member, record.scope, marker).await {
            Ok(()) | Err(PlatformError::RoleNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        for role in &record.prior_roles {
            match platform.grant_role(record.member, record.scope, *role).await {
                Ok(()) => {}
                Err(PlatformError::RoleNotFound(_)) => {
                    debug!(role_id = %role, "Snapshotted role no longer exists, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Best-effort undo of a partially applied restriction.
    async fn rollback(&self, key: RestrictionKey, stripped: &[RoleId], marker_granted: bool) {
        let platform = &self.inner.platform;

        if marker_granted {
            if let Err(e) = platform
                .revoke_role(key.member, key.scope, self.inner.config.marker_role)
                .await
            {
                error!(key = %key, error = %e, "Rollback could not remove restriction marker");
            }
        }

        for role in stripped {
            if let Err(e) = platform.grant_role(key.member, key.scope, *role).await {
                error!(key = %key, role_id = %role, error = %e, "Rollback could not restore role");
            }
        }
    }

    /// Arm (or replace) the reversal timer for `key`. Caller holds the key lock.
    fn arm_timer(&self, key: RestrictionKey, expires_at: DateTime<Utc>) {
        let wait = (expires_at - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            + self.inner.config.timer_slack;
        self.schedule(key, expires_at, wait, 0);
    }

    /// Schedule another reversal attempt after a failure. Caller holds the key lock.
    fn arm_retry(&self, key: RestrictionKey, expires_at: DateTime<Utc>, attempt: u32) {
        let wait = retry_delay(attempt);
        warn!(key = %key, attempt, retry_in_secs = wait.as_secs(), "Scheduling reversal retry");
        self.schedule(key, expires_at, wait, attempt);
    }

    fn schedule(
        &self,
        key: RestrictionKey,
        expires_at: DateTime<Utc>,
        wait: Duration,
        attempt: u32,
    ) {
        let id = self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                TimedRestrictionManager { inner }.fire_timer(key, id).await;
            }
        });

        if let Some(previous) = self
            .inner
            .timers
            .insert(
                key,
                TimerEntry {
                    id,
                    expires_at,
                    attempt,
                    handle,
                },
            )
        {
            previous.handle.abort();
        }

        debug!(key = %key, timer_id = id, wait_ms = wait.as_millis() as u64, "Reversal timer armed");
        self.emit_event(RestrictionEvent::TimerArmed { key, expires_at });
    }

    /// Remove and abort the timer for `key`. Caller holds the key lock.
    fn cancel_timer(&self, key: &RestrictionKey) {
        if let Some((_, entry)) = self.inner.timers.remove(key) {
            entry.handle.abort();
        }
    }

    async fn fire_timer(&self, key: RestrictionKey, timer_id: u64) {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let current = self
            .inner
            .timers
            .get(&key)
            .filter(|entry| entry.id == timer_id)
            .map(|entry| (entry.expires_at, entry.attempt));
        let Some((expires_at, attempt)) = current else {
            debug!(key = %key, timer_id, "Stale reversal timer, ignoring");
            return;
        };
        // Detach our own entry without aborting the running task.
        self.inner.timers.remove(&key);

        let record = match self.inner.store.get_restriction(&key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key = %key, "Timer fired for a reversed restriction");
                return;
            }
            Err(e) => {
                error!(key = %key, error = %e, "Timer could not load restriction");
                self.emit_event(RestrictionEvent::ReversalFailed {
                    key,
                    origin: ReversalOrigin::Timer,
                    reason: e.to_string(),
                });
                self.arm_retry(key, expires_at, attempt + 1);
                return;
            }
        };

        if !record.is_expired(self.inner.clock.now()) {
            self.arm_timer(key, record.expires_at);
            return;
        }

        match self.reverse_locked(key, ReversalOrigin::Timer).await {
            Ok(_) | Err(RestrictionError::NotRestricted(_)) => {}
            Err(e) => {
                warn!(key = %key, attempt, error = %e, "Timed reversal failed");
                self.arm_retry(key, record.expires_at, attempt + 1);
            }
        }
    }

    fn emit_event(&self, event: RestrictionEvent) {
        let _ = self.inner.event_tx.send(event);
    }
}
