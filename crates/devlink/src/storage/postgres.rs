use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::outbox::{OutboxEntry, OutboxId, OutboxMessage, OutboxStore};
use super::StoreError;
use crate::workflows::applications::{ApplicationId, ApplicationRecord, ApplicationRepository};
use crate::workflows::interviews::{InterviewRecord, InterviewRepository, Upserted};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS applications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        job_id TEXT NOT NULL,
        cover_note TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS applications_user_id_idx ON applications (user_id)",
    "CREATE TABLE IF NOT EXISTS interviews (
        application_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        job_id TEXT NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS outbox (
        id UUID PRIMARY KEY,
        queue TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload BYTEA NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        dispatched_at TIMESTAMPTZ
    )",
    "ALTER TABLE outbox ADD COLUMN IF NOT EXISTS claimed_until TIMESTAMPTZ",
    "CREATE INDEX IF NOT EXISTS outbox_pending_idx ON outbox (created_at) WHERE dispatched_at IS NULL",
];

/// Postgres-backed implementation of every repository the pipeline uses.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Creates the tables if they are missing. Safe to run from every process.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        info!("record store schema ready");
        Ok(())
    }
}

fn application_from_row(row: &PgRow) -> Result<ApplicationRecord, sqlx::Error> {
    Ok(ApplicationRecord {
        id: ApplicationId(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        job_id: row.try_get("job_id")?,
        cover_note: row.try_get("cover_note")?,
    })
}

fn interview_from_row(row: &PgRow) -> Result<InterviewRecord, sqlx::Error> {
    Ok(InterviewRecord {
        application_id: ApplicationId(row.try_get("application_id")?),
        user_id: row.try_get("user_id")?,
        job_id: row.try_get("job_id")?,
        scheduled_at: row.try_get::<DateTime<Utc>, _>("scheduled_at")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxEntry, sqlx::Error> {
    let attempts: i32 = row.try_get("attempts")?;
    Ok(OutboxEntry {
        message: OutboxMessage {
            id: OutboxId(row.try_get::<Uuid, _>("id")?),
            queue: row.try_get("queue")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
        },
        created_at: row.try_get("created_at")?,
        attempts: attempts.max(0) as u32,
        last_error: row.try_get("last_error")?,
        dispatched_at: row.try_get("dispatched_at")?,
        claimed_until: row.try_get("claimed_until")?,
    })
}

#[async_trait]
impl ApplicationRepository for PostgresStore {
    async fn insert(
        &self,
        record: ApplicationRecord,
        event: OutboxMessage,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO applications (id, user_id, job_id, cover_note) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.id.as_str())
        .bind(&record.user_id)
        .bind(&record.job_id)
        .bind(&record.cover_note)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO outbox (id, queue, event_type, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(event.id.0)
        .bind(&event.queue)
        .bind(&event.event_type)
        .bind(&event.payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, job_id, cover_note FROM applications WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(application_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, queue, event_type, payload, created_at, attempts, last_error, dispatched_at,
                    claimed_until
             FROM outbox WHERE dispatched_at IS NULL ORDER BY created_at LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(outbox_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn claim(&self, limit: usize, lease: Duration) -> Result<Vec<OutboxEntry>, StoreError> {
        // Row locks keep concurrent relays apart while the claim is written; the
        // lease keeps them apart until the relay settles the entry.
        let rows = sqlx::query(
            "UPDATE outbox SET claimed_until = NOW() + $2 * INTERVAL '1 second'
             WHERE id IN (
                 SELECT id FROM outbox
                 WHERE dispatched_at IS NULL
                   AND (claimed_until IS NULL OR claimed_until <= NOW())
                   AND (attempts > 0 OR created_at <= NOW() - $2 * INTERVAL '1 second')
                 ORDER BY created_at
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, queue, event_type, payload, created_at, attempts, last_error,
                       dispatched_at, claimed_until",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .iter()
            .map(outbox_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn mark_dispatched(&self, id: OutboxId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE outbox SET dispatched_at = COALESCE(dispatched_at, NOW()) WHERE id = $1",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox SET attempts = attempts + 1, last_error = $2, claimed_until = NULL
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InterviewRepository for PostgresStore {
    async fn upsert(&self, record: InterviewRecord) -> Result<Upserted, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO interviews (application_id, user_id, job_id, scheduled_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (application_id) DO NOTHING
             RETURNING application_id, user_id, job_id, scheduled_at",
        )
        .bind(record.application_id.as_str())
        .bind(&record.user_id)
        .bind(&record.job_id)
        .bind(record.scheduled_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Upserted::Created(interview_from_row(&row)?));
        }

        let existing = self
            .fetch(&record.application_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(Upserted::Existing(existing))
    }

    async fn fetch(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<InterviewRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT application_id, user_id, job_id, scheduled_at FROM interviews WHERE application_id = $1",
        )
        .bind(application_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(interview_from_row)
            .transpose()
            .map_err(StoreError::from)
    }
}
