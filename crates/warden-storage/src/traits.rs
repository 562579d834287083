use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_types::{
    MemberId, NewSanction, RestrictionKey, RestrictionRecord, SanctionEvent, ScopeId,
};

use crate::StorageResult;

/// Append-only sanction event log.
#[async_trait]
pub trait SanctionEventStore: Send + Sync {
    /// Append an event. The store assigns its id and sequence number.
    async fn append_event(
        &self,
        sanction: NewSanction,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<SanctionEvent>;

    /// Every event for a member in a scope, oldest first by
    /// (timestamp, sequence).
    async fn list_events(&self, member: MemberId, scope: ScopeId)
        -> StorageResult<Vec<SanctionEvent>>;
}

/// Table of restrictions currently in force.
#[async_trait]
pub trait RestrictionStore: Send + Sync {
    /// Insert a record. Fails with [`crate::StorageError::Conflict`] if the
    /// key already has a live record; the existing row is left untouched.
    async fn put_restriction(&self, record: RestrictionRecord) -> StorageResult<()>;

    async fn get_restriction(&self, key: &RestrictionKey)
        -> StorageResult<Option<RestrictionRecord>>;

    /// Delete a record, returning whether one existed.
    async fn remove_restriction(&self, key: &RestrictionKey) -> StorageResult<bool>;

    /// All live records, soonest expiry first.
    async fn list_restrictions(&self) -> StorageResult<Vec<RestrictionRecord>>;
}

/// Storage bundle used by the moderation service.
pub trait ModerationStorage: SanctionEventStore + RestrictionStore + Send + Sync {}

impl<T> ModerationStorage for T where T: SanctionEventStore + RestrictionStore + Send + Sync {}
