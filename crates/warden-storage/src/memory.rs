//! In-memory reference implementation of the warden storage traits.
//!
//! Deterministic and test-friendly. Nothing survives the process, so
//! deployments that need restart-safe restrictions use the PostgreSQL
//! adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_types::{
    MemberId, NewSanction, RestrictionKey, RestrictionRecord, SanctionEvent, ScopeId,
};

use crate::traits::{RestrictionStore, SanctionEventStore};
use crate::{StorageError, StorageResult};

/// In-memory warden storage adapter.
#[derive(Default)]
pub struct InMemoryModerationStorage {
    events: RwLock<Vec<SanctionEvent>>,
    restrictions: RwLock<HashMap<RestrictionKey, RestrictionRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryModerationStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StorageError::Backend`], as if
    /// the database had gone away. Used for fault-injection tests.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("storage unavailable".to_string()));
        }
        Ok(())
    }

    /// Seed a restriction row directly, bypassing the conflict check.
    ///
    /// Simulates state left behind by a previous process.
    pub fn seed_restriction(&self, record: RestrictionRecord) -> StorageResult<()> {
        let mut guard = self
            .restrictions
            .write()
            .map_err(|_| StorageError::Backend("restriction lock poisoned".to_string()))?;
        guard.insert(record.key(), record);
        Ok(())
    }
}

#[async_trait]
impl SanctionEventStore for InMemoryModerationStorage {
    async fn append_event(
        &self,
        sanction: NewSanction,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<SanctionEvent> {
        self.check_available()?;
        let mut guard = self
            .events
            .write()
            .map_err(|_| StorageError::Backend("event lock poisoned".to_string()))?;

        let sequence = guard.len() as u64 + 1;
        let event = SanctionEvent::from_draft(sanction, sequence, timestamp);
        guard.push(event.clone());
        Ok(event)
    }

    async fn list_events(
        &self,
        member: MemberId,
        scope: ScopeId,
    ) -> StorageResult<Vec<SanctionEvent>> {
        self.check_available()?;
        let guard = self
            .events
            .read()
            .map_err(|_| StorageError::Backend("event lock poisoned".to_string()))?;

        let mut events = guard
            .iter()
            .filter(|e| e.member == member && e.scope == scope)
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        Ok(events)
    }
}

#[async_trait]
impl RestrictionStore for InMemoryModerationStorage {
    async fn put_restriction(&self, record: RestrictionRecord) -> StorageResult<()> {
        self.check_available()?;
        let mut guard = self
            .restrictions
            .write()
            .map_err(|_| StorageError::Backend("restriction lock poisoned".to_string()))?;

        let key = record.key();
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "restriction for {key} already exists"
            )));
        }
        guard.insert(key, record);
        Ok(())
    }

    async fn get_restriction(
        &self,
        key: &RestrictionKey,
    ) -> StorageResult<Option<RestrictionRecord>> {
        self.check_available()?;
        let guard = self
            .restrictions
            .read()
            .map_err(|_| StorageError::Backend("restriction lock poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn remove_restriction(&self, key: &RestrictionKey) -> StorageResult<bool> {
        self.check_available()?;
        let mut guard = self
            .restrictions
            .write()
            .map_err(|_| StorageError::Backend("restriction lock poisoned".to_string()))?;
        Ok(guard.remove(key).is_some())
    }

    async fn list_restrictions(&self) -> StorageResult<Vec<RestrictionRecord>> {
        self.check_available()?;
        let guard = self
            .restrictions
            .read()
            .map_err(|_| StorageError::Backend("restriction lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(values)
    }
}
