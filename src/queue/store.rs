//! Job persistence
//!
//! Stores only record what the queue decided; they never schedule. Every
//! status change goes through [`JobStore::transition`], a conditional update
//! that applies only when the job is still in the expected state, so a
//! cancelled job cannot be started and a finished job cannot be revived.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::{JobFilter, JobStatus, JobTransition, QueueJob};
use crate::error::{HeapError, Result};

/// Where job records live
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &QueueJob) -> Result<()>;

    /// Apply `transition` if job `id` currently has status `from`. Returns
    /// whether the record changed; an unknown id or a stale `from` is not an
    /// error.
    async fn transition(&self, id: Uuid, from: JobStatus, transition: &JobTransition)
        -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueJob>>;

    /// Jobs matching `filter`, oldest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<QueueJob>>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<Vec<QueueJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &QueueJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|existing| existing.id == job.id) {
            return Err(HeapError::Internal(format!("Job {} already exists", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        transition: &JobTransition,
    ) -> Result<bool> {
        if !from.can_transition_to(transition.status) {
            return Ok(false);
        }

        let mut jobs = self.jobs.write().await;
        match jobs.iter_mut().find(|job| job.id == id) {
            Some(job) if job.status == from => {
                job.apply(transition);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<QueueJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|job| filter.matches(job))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// SQLite-backed store, see `migrations/`
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and apply migrations
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &QueueJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_jobs
                (id, job_type, status, payload, result, error, enqueued_at, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.job_type)
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.payload)?)
        .bind(job.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(job.error.as_deref())
        .bind(job.enqueued_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        transition: &JobTransition,
    ) -> Result<bool> {
        if !from.can_transition_to(transition.status) {
            return Ok(false);
        }

        let result = transition
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let outcome = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = ?,
                started_at = COALESCE(?, started_at),
                finished_at = COALESCE(?, finished_at),
                error = COALESCE(?, error),
                result = COALESCE(?, result)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(transition.status.as_str())
        .bind(transition.started_at())
        .bind(transition.finished_at())
        .bind(transition.error.as_deref())
        .bind(result)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_type, status, payload, result, error,
                   enqueued_at, started_at, finished_at
            FROM queue_jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(QueueJob::try_from).transpose()
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<QueueJob>> {
        let status = filter.status.map(|s| s.as_str());
        // SQLite treats a negative LIMIT as unbounded
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, job_type, status, payload, result, error,
                   enqueued_at, started_at, finished_at
            FROM queue_jobs
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR job_type = ?)
            ORDER BY enqueued_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(filter.job_type.as_deref())
        .bind(filter.job_type.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

// Internal row type for sqlx

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    status: String,
    payload: String,
    result: Option<String>,
    error: Option<String>,
    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for QueueJob {
    type Error = HeapError;

    fn try_from(row: JobRow) -> Result<Self> {
        let result = row
            .result
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| HeapError::Internal(format!("Invalid job result: {}", e)))?;

        Ok(QueueJob {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| HeapError::Internal(format!("Invalid UUID: {}", e)))?,
            job_type: row.job_type,
            status: row
                .status
                .parse()
                .map_err(|e| HeapError::Internal(format!("Invalid status: {}", e)))?,
            payload: serde_json::from_str(&row.payload)
                .map_err(|e| HeapError::Internal(format!("Invalid job payload: {}", e)))?,
            result,
            error: row.error,
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
