//! PostgreSQL adapter for warden storage.
//!
//! The source of truth for restart-safe restrictions: a restriction row
//! outlives the process, and startup reconciliation reads it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;
use warden_types::{
    EventId, MemberId, NewSanction, RestrictionKey, RestrictionRecord, RoleId, SanctionAction,
    SanctionCategory, SanctionEvent, ScopeId,
};

use crate::traits::{RestrictionStore, SanctionEventStore};
use crate::{StorageError, StorageResult};

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresModerationStorage {
    pool: PgPool,
}

impl PostgresModerationStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS warden_sanction_events (
                sequence BIGSERIAL PRIMARY KEY,
                event_id UUID NOT NULL UNIQUE,
                member_id BIGINT NOT NULL,
                member_name TEXT NOT NULL,
                scope_id BIGINT NOT NULL,
                category TEXT NOT NULL,
                action TEXT NOT NULL,
                reason TEXT NOT NULL,
                actor_id BIGINT NOT NULL,
                actor_name TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ,
                counted BOOLEAN NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS warden_sanction_events_member_scope
                ON warden_sanction_events (member_id, scope_id, timestamp, sequence)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_restrictions (
                member_id BIGINT NOT NULL,
                scope_id BIGINT NOT NULL,
                reason TEXT NOT NULL,
                applied_by BIGINT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                prior_roles BIGINT[] NOT NULL,
                PRIMARY KEY (member_id, scope_id)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SanctionEventStore for PostgresModerationStorage {
    async fn append_event(
        &self,
        sanction: NewSanction,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<SanctionEvent> {
        let event_id = EventId::generate();
        let row = sqlx::query(
            r#"
            INSERT INTO warden_sanction_events
                (event_id, member_id, member_name, scope_id, category, action, reason,
                 actor_id, actor_name, timestamp, expires_at, counted)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING sequence
            "#,
        )
        .bind(event_id.0)
        .bind(to_i64(sanction.member.id.get())?)
        .bind(sanction.member.display_name.clone())
        .bind(to_i64(sanction.scope.get())?)
        .bind(sanction.category.as_str())
        .bind(sanction.action.as_str())
        .bind(sanction.reason.clone())
        .bind(to_i64(sanction.actor.id.get())?)
        .bind(sanction.actor.display_name.clone())
        .bind(timestamp)
        .bind(sanction.expires_at)
        .bind(sanction.counted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut event = SanctionEvent::from_draft(sanction, from_i64(sequence)?, timestamp);
        event.id = event_id;
        Ok(event)
    }

    async fn list_events(
        &self,
        member: MemberId,
        scope: ScopeId,
    ) -> StorageResult<Vec<SanctionEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, event_id, member_id, member_name, scope_id, category, action,
                   reason, actor_id, actor_name, timestamp, expires_at, counted
              FROM warden_sanction_events
             WHERE member_id = $1 AND scope_id = $2
             ORDER BY timestamp ASC, sequence ASC
            "#,
        )
        .bind(to_i64(member.get())?)
        .bind(to_i64(scope.get())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(event_row_to_record).collect()
    }
}

#[async_trait]
impl RestrictionStore for PostgresModerationStorage {
    async fn put_restriction(&self, record: RestrictionRecord) -> StorageResult<()> {
        let prior_roles = record
            .prior_roles
            .iter()
            .map(|role| to_i64(role.get()))
            .collect::<StorageResult<Vec<_>>>()?;

        sqlx::query(
            r#"
            INSERT INTO warden_restrictions
                (member_id, scope_id, reason, applied_by, applied_at, expires_at, prior_roles)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(to_i64(record.member.get())?)
        .bind(to_i64(record.scope.get())?)
        .bind(record.reason)
        .bind(to_i64(record.applied_by.get())?)
        .bind(record.applied_at)
        .bind(record.expires_at)
        .bind(prior_roles)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_restriction(
        &self,
        key: &RestrictionKey,
    ) -> StorageResult<Option<RestrictionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT member_id, scope_id, reason, applied_by, applied_at, expires_at, prior_roles
              FROM warden_restrictions
             WHERE member_id = $1 AND scope_id = $2
            "#,
        )
        .bind(to_i64(key.member.get())?)
        .bind(to_i64(key.scope.get())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(restriction_row_to_record).transpose()
    }

    async fn remove_restriction(&self, key: &RestrictionKey) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM warden_restrictions WHERE member_id = $1 AND scope_id = $2",
        )
        .bind(to_i64(key.member.get())?)
        .bind(to_i64(key.scope.get())?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_restrictions(&self) -> StorageResult<Vec<RestrictionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT member_id, scope_id, reason, applied_by, applied_at, expires_at, prior_roles
              FROM warden_restrictions
             ORDER BY expires_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(restriction_row_to_record).collect()
    }
}

fn event_row_to_record(row: PgRow) -> StorageResult<SanctionEvent> {
    let category_raw: String = get(&row, "category")?;
    let action_raw: String = get(&row, "action")?;
    let event_id: Uuid = get(&row, "event_id")?;

    Ok(SanctionEvent {
        id: EventId(event_id),
        sequence: from_i64(get(&row, "sequence")?)?,
        member: MemberId::new(from_i64(get(&row, "member_id")?)?),
        member_name: get(&row, "member_name")?,
        scope: ScopeId::new(from_i64(get(&row, "scope_id")?)?),
        category: SanctionCategory::parse(&category_raw).ok_or_else(|| {
            StorageError::Serialization(format!("unknown sanction category `{category_raw}`"))
        })?,
        action: SanctionAction::parse(&action_raw).ok_or_else(|| {
            StorageError::Serialization(format!("unknown sanction action `{action_raw}`"))
        })?,
        reason: get(&row, "reason")?,
        actor: MemberId::new(from_i64(get(&row, "actor_id")?)?),
        actor_name: get(&row, "actor_name")?,
        timestamp: get(&row, "timestamp")?,
        expires_at: get(&row, "expires_at")?,
        counted: get(&row, "counted")?,
    })
}

fn restriction_row_to_record(row: PgRow) -> StorageResult<RestrictionRecord> {
    let prior_roles: Vec<i64> = get(&row, "prior_roles")?;

    Ok(RestrictionRecord {
        member: MemberId::new(from_i64(get(&row, "member_id")?)?),
        scope: ScopeId::new(from_i64(get(&row, "scope_id")?)?),
        reason: get(&row, "reason")?,
        applied_by: MemberId::new(from_i64(get(&row, "applied_by")?)?),
        applied_at: get(&row, "applied_at")?,
        expires_at: get(&row, "expires_at")?,
        prior_roles: prior_roles
            .into_iter()
            .map(|raw| from_i64(raw).map(RoleId::new))
            .collect::<StorageResult<Vec<_>>>()?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Serialization(format!("column `{column}`: {e}")))
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput(format!("id {value} does not fit BIGINT")))
}

fn from_i64(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("negative id {value} in storage")))
}
