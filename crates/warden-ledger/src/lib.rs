//! Warden Ledger - escalation counts derived from sanction history.
//!
//! The ledger never keeps a counter. Every count is a replay of the member's
//! full event history in (timestamp, sequence) order:
//!
//! - warnings: +1 per add, -1 per remove, floored at zero at every step
//! - restrictions, removals, bans: number of counted `add` events; `remove`
//!   events in these categories are annotations and never decrement
//!
//! Appends never touch existing rows, so concurrent writers cannot corrupt a
//! count; a read may simply miss an event written a moment later.

#![deny(unsafe_code)]

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use warden_storage::{SanctionEventStore, StorageError};
use warden_types::{
    Clock, LogKind, MemberId, NewSanction, SanctionAction, SanctionCategory, SanctionCounts,
    SanctionEvent, ScopeId, SystemClock,
};

/// Number of events per page in reporting views.
pub const HISTORY_PAGE_SIZE: usize = 5;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One page of a member's history, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub events: Vec<SanctionEvent>,
    /// Zero-based page index actually returned (clamped to the last page).
    pub page: usize,
    pub total_pages: usize,
    pub total_events: usize,
}

/// Append-only sanction ledger.
pub struct EscalationLedger {
    store: Arc<dyn SanctionEventStore>,
    clock: Arc<dyn Clock>,
}

impl EscalationLedger {
    /// Create a ledger stamping events with the system clock.
    pub fn new(store: Arc<dyn SanctionEventStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn SanctionEventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an event. The timestamp comes from the ledger's clock.
    pub async fn record_event(&self, sanction: NewSanction) -> Result<SanctionEvent, LedgerError> {
        let event = self.store.append_event(sanction, self.clock.now()).await?;
        debug!(
            member_id = %event.member,
            scope_id = %event.scope,
            category = %event.category,
            action = event.action.as_str(),
            sequence = event.sequence,
            "Sanction event recorded"
        );
        Ok(event)
    }

    /// Current tally for one category.
    pub async fn count_for(
        &self,
        member: MemberId,
        scope: ScopeId,
        category: SanctionCategory,
    ) -> Result<u32, LedgerError> {
        Ok(self.counts(member, scope).await?.get(category))
    }

    /// All tallies, from a single read of the history.
    pub async fn counts(
        &self,
        member: MemberId,
        scope: ScopeId,
    ) -> Result<SanctionCounts, LedgerError> {
        let events = self.store.list_events(member, scope).await?;
        Ok(tally(&events))
    }

    /// History for `kind`, newest first.
    pub async fn history(
        &self,
        member: MemberId,
        scope: ScopeId,
        kind: LogKind,
    ) -> Result<Vec<SanctionEvent>, LedgerError> {
        let mut events = self
            .store
            .list_events(member, scope)
            .await?
            .into_iter()
            .filter(|e| e.matches(kind))
            .collect::<Vec<_>>();
        events.sort_by(|a, b| history_order(b, a));
        Ok(events)
    }

    /// A page of [`HISTORY_PAGE_SIZE`] events, newest first.
    pub async fn history_page(
        &self,
        member: MemberId,
        scope: ScopeId,
        kind: LogKind,
        page: usize,
    ) -> Result<HistoryPage, LedgerError> {
        let events = self.history(member, scope, kind).await?;
        Ok(paginate(events, page))
    }
}

/// Total order of the event log: timestamp, then append sequence.
pub fn history_order(a: &SanctionEvent, b: &SanctionEvent) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Replay `events` into per-category tallies. Input order does not matter.
pub fn tally(events: &[SanctionEvent]) -> SanctionCounts {
    let mut ordered = events.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| history_order(a, b));

    let mut counts = SanctionCounts::default();
    for event in ordered {
        match (event.category, event.action) {
            (SanctionCategory::Warning, SanctionAction::Add) => counts.warnings += 1,
            (SanctionCategory::Warning, SanctionAction::Remove) => {
                counts.warnings = counts.warnings.saturating_sub(1)
            }
            (SanctionCategory::Restriction, SanctionAction::Add) if event.counted => {
                counts.restrictions += 1
            }
            (SanctionCategory::Removal, SanctionAction::Add) if event.counted => {
                counts.removals += 1
            }
            (SanctionCategory::Ban, SanctionAction::Add) if event.counted => counts.bans += 1,
            _ => {}
        }
    }
    counts
}

fn paginate(events: Vec<SanctionEvent>, page: usize) -> HistoryPage {
    let total_events = events.len();
    let total_pages = total_events.div_ceil(HISTORY_PAGE_SIZE).max(1);
    let page = page.min(total_pages - 1);
    let events = events
        .into_iter()
        .skip(page * HISTORY_PAGE_SIZE)
        .take(HISTORY_PAGE_SIZE)
        .collect();

    HistoryPage {
        events,
        page,
        total_pages,
        total_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use warden_storage::InMemoryModerationStorage;
    use warden_types::{Identity, ManualClock};

    const MEMBER: MemberId = MemberId(1);
    const SCOPE: ScopeId = ScopeId(100);

    fn target() -> Identity {
        Identity::new(MEMBER, "target")
    }

    fn moderator() -> Identity {
        Identity::new(MemberId::new(7), "moderator")
    }

    fn add(category: SanctionCategory) -> NewSanction {
        NewSanction::add(category, target(), SCOPE, "reason", moderator())
    }

    fn remove(category: SanctionCategory) -> NewSanction {
        NewSanction::remove(category, target(), SCOPE, "undo", moderator())
    }

    fn ledger_with_clock() -> (EscalationLedger, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let ledger = EscalationLedger::with_clock(
            Arc::new(InMemoryModerationStorage::new()),
            Arc::new(clock.clone()),
        );
        (ledger, clock)
    }

    #[tokio::test]
    async fn test_warning_count_is_removal_aware() {
        let (ledger, clock) = ledger_with_clock();
        for draft in [
            add(SanctionCategory::Warning),
            add(SanctionCategory::Warning),
            add(SanctionCategory::Warning),
            remove(SanctionCategory::Warning),
        ] {
            ledger.record_event(draft).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let count = ledger
            .count_for(MEMBER, SCOPE, SanctionCategory::Warning)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_remove_on_empty_history_stays_zero() {
        let (ledger, clock) = ledger_with_clock();
        ledger
            .record_event(remove(SanctionCategory::Warning))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        assert_eq!(
            ledger
                .count_for(MEMBER, SCOPE, SanctionCategory::Warning)
                .await
                .unwrap(),
            0
        );

        // The early removal must not pre-pay a later warning.
        ledger
            .record_event(add(SanctionCategory::Warning))
            .await
            .unwrap();
        assert_eq!(
            ledger
                .count_for(MEMBER, SCOPE, SanctionCategory::Warning)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_non_warning_removes_do_not_decrement() {
        let (ledger, _clock) = ledger_with_clock();
        ledger.record_event(add(SanctionCategory::Ban)).await.unwrap();
        ledger
            .record_event(remove(SanctionCategory::Ban))
            .await
            .unwrap();
        ledger
            .record_event(add(SanctionCategory::Restriction))
            .await
            .unwrap();
        ledger
            .record_event(add(SanctionCategory::Restriction).uncounted())
            .await
            .unwrap();
        ledger
            .record_event(add(SanctionCategory::Unrestriction))
            .await
            .unwrap();

        let counts = ledger.counts(MEMBER, SCOPE).await.unwrap();
        assert_eq!(counts.bans, 1);
        assert_eq!(counts.restrictions, 1);
        assert_eq!(counts.get(SanctionCategory::Unrestriction), 0);
    }

    #[tokio::test]
    async fn test_counts_are_per_scope() {
        let (ledger, _clock) = ledger_with_clock();
        ledger
            .record_event(add(SanctionCategory::Warning))
            .await
            .unwrap();
        let elsewhere = ledger
            .count_for(MEMBER, ScopeId::new(200), SanctionCategory::Warning)
            .await
            .unwrap();
        assert_eq!(elsewhere, 0);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_filtered() {
        let (ledger, clock) = ledger_with_clock();
        let first = ledger
            .record_event(add(SanctionCategory::Warning))
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        ledger
            .record_event(add(SanctionCategory::Restriction))
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let last = ledger
            .record_event(add(SanctionCategory::Warning))
            .await
            .unwrap();

        let warnings = ledger
            .history(MEMBER, SCOPE, LogKind::Warning)
            .await
            .unwrap();
        assert_eq!(
            warnings.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![last.id, first.id]
        );

        let all = ledger.history(MEMBER, SCOPE, LogKind::All).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, last.id);
    }

    #[tokio::test]
    async fn test_same_timestamp_orders_by_sequence() {
        let (ledger, _clock) = ledger_with_clock();
        let a = ledger
            .record_event(add(SanctionCategory::Warning))
            .await
            .unwrap();
        let b = ledger
            .record_event(remove(SanctionCategory::Warning))
            .await
            .unwrap();
        assert_eq!(a.timestamp, b.timestamp);

        let history = ledger.history(MEMBER, SCOPE, LogKind::All).await.unwrap();
        assert_eq!(history[0].id, b.id);
        assert_eq!(
            ledger
                .count_for(MEMBER, SCOPE, SanctionCategory::Warning)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_history_pages_in_chunks_of_five() {
        let (ledger, clock) = ledger_with_clock();
        for _ in 0..12 {
            ledger
                .record_event(add(SanctionCategory::Warning))
                .await
                .unwrap();
            clock.advance(Duration::seconds(1));
        }

        let first = ledger
            .history_page(MEMBER, SCOPE, LogKind::All, 0)
            .await
            .unwrap();
        assert_eq!(first.events.len(), 5);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_events, 12);

        let beyond = ledger
            .history_page(MEMBER, SCOPE, LogKind::All, 9)
            .await
            .unwrap();
        assert_eq!(beyond.page, 2);
        assert_eq!(beyond.events.len(), 2);

        let empty = ledger
            .history_page(MEMBER, SCOPE, LogKind::Ban, 0)
            .await
            .unwrap();
        assert_eq!(empty.total_pages, 1);
        assert!(empty.events.is_empty());
    }

    fn event(category: SanctionCategory, action: SanctionAction, sequence: u64) -> SanctionEvent {
        let draft = match action {
            SanctionAction::Add => add(category),
            SanctionAction::Remove => remove(category),
        };
        SanctionEvent::from_draft(
            draft,
            sequence,
            Utc::now() - Duration::days(1) + Duration::seconds(sequence as i64),
        )
    }

    proptest! {
        #[test]
        fn property_warning_tally_matches_clamped_model(adds in proptest::collection::vec(any::<bool>(), 0..40)) {
            let events = adds
                .iter()
                .enumerate()
                .map(|(i, is_add)| {
                    let action = if *is_add { SanctionAction::Add } else { SanctionAction::Remove };
                    event(SanctionCategory::Warning, action, i as u64 + 1)
                })
                .collect::<Vec<_>>();

            let mut model: u32 = 0;
            for is_add in &adds {
                model = if *is_add { model + 1 } else { model.saturating_sub(1) };
            }

            let mut shuffled = events.clone();
            shuffled.reverse();
            prop_assert_eq!(tally(&events).warnings, model);
            prop_assert_eq!(tally(&shuffled).warnings, model);
        }

        #[test]
        fn property_restriction_tally_counts_adds_only(ops in proptest::collection::vec(any::<bool>(), 0..40)) {
            let events = ops
                .iter()
                .enumerate()
                .map(|(i, is_add)| {
                    let action = if *is_add { SanctionAction::Add } else { SanctionAction::Remove };
                    event(SanctionCategory::Restriction, action, i as u64 + 1)
                })
                .collect::<Vec<_>>();
            let adds = ops.iter().filter(|a| **a).count() as u32;
            prop_assert_eq!(tally(&events).restrictions, adds);
        }
    }
}
