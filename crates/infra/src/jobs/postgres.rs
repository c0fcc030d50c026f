//! Postgres-backed job store.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id         BIGSERIAL PRIMARY KEY,
//!     status     TEXT NOT NULL,
//!     result     TEXT NOT NULL DEFAULT '',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! )
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | JobStoreError |
//! |------------|---------------|
//! | `RowNotFound` | `NotFound` |
//! | anything else (pool closed, IO, database) | `Storage` |
//!
//! The terminal-transition guard lives in the `UPDATE ... WHERE status = 'received'`
//! clause, so two workers racing on a redelivered descriptor cannot both win.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

use jobpipe_core::{JobId, JobRecord, JobStatus};

use super::store::{ensure_terminal, JobStore, JobStoreError, UpdateOutcome};

/// Postgres job table.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    status: String,
    result: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(|e| {
            JobStoreError::Storage(format!("job {} has unreadable status: {e}", row.id))
        })?;
        Ok(JobRecord {
            id: JobId::new(row.id),
            status,
            result: row.result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool and make sure the jobs table exists.
    pub async fn connect(database_url: &str) -> Result<Self, JobStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Idempotent `CREATE TABLE IF NOT EXISTS`.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id         BIGSERIAL PRIMARY KEY,
                status     TEXT NOT NULL,
                result     TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self), err)]
    async fn create_job(&self) -> Result<JobId, JobStoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO jobs (status, result) VALUES ($1, '') RETURNING id",
        )
        .bind(JobStatus::Received.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_job", e))?;

        Ok(JobId::new(id))
    }

    #[instrument(skip(self, result), fields(job_id = %id, status = %status), err)]
    async fn update_job(
        &self,
        id: JobId,
        status: JobStatus,
        result: &str,
    ) -> Result<UpdateOutcome, JobStoreError> {
        ensure_terminal(id, status)?;

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, result = $2, updated_at = NOW()
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(status.as_str())
        .bind(result)
        .bind(id.as_i64())
        .bind(JobStatus::Received.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if updated.rows_affected() == 1 {
            return Ok(UpdateOutcome::Applied);
        }

        // Either the row is gone or it already reached a terminal status.
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_job_lookup", e))?;

        match exists {
            Some(_) => {
                debug!(job_id = %id, "job already terminal; update skipped");
                Ok(UpdateOutcome::AlreadyTerminal)
            }
            None => Err(JobStoreError::NotFound(id)),
        }
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get_job(&self, id: JobId) -> Result<JobRecord, JobStoreError> {
        let row: JobRow = sqlx::query_as(
            r#"
            SELECT id, status, result, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => JobStoreError::NotFound(id),
            other => map_sqlx_error("get_job", other),
        })?;

        row.try_into()
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn delete_job(&self, id: JobId) -> Result<(), JobStoreError> {
        let deleted = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.as_i64())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_job", e))?;

        if deleted.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), JobStoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Storage(format!(
            "database error in {}: {} (code {})",
            operation,
            db_err.message(),
            db_err.code().as_deref().unwrap_or("unknown")
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed during {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            JobStoreError::Storage(format!("timed out acquiring a connection for {operation}"))
        }
        other => JobStoreError::Storage(format!("{operation} failed: {other}")),
    }
}
