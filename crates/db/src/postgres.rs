//! PostgreSQL-backed [`StatusStore`] and [`WorkQueue`].
//!
//! The status table mirrors a partitioned key-value table: the primary key
//! is `(partition_key, row_key)` and writes are unconditional upserts.
//! Queues are rows in `queue_messages` tagged with the queue name.

use async_trait::async_trait;
use imagejob_core::job::{
    shadowed_field, JobId, JobStatus, JobStatusRecord, WorkMessage, PROCESSING_QUEUE,
};
use imagejob_core::storage::{ensure_persistable, Lookup, StatusStore, StorageError, WorkQueue};
use imagejob_core::types::Timestamp;
use sqlx::FromRow;

use crate::DbPool;

/// Column list for `jobstatus` queries.
const COLUMNS: &str = "partition_key, row_key, status, created, image_url, extra";

fn unavailable(err: sqlx::Error) -> StorageError {
    StorageError::Unavailable(err.to_string())
}

// ---------------------------------------------------------------------------
// Status store
// ---------------------------------------------------------------------------

/// A row from the `jobstatus` table.
#[derive(Debug, FromRow)]
struct JobStatusRow {
    partition_key: String,
    row_key: String,
    status: String,
    created: Timestamp,
    image_url: String,
    extra: serde_json::Value,
}

impl TryFrom<JobStatusRow> for JobStatusRecord {
    type Error = StorageError;

    fn try_from(row: JobStatusRow) -> Result<Self, Self::Error> {
        let job_id = JobId::parse(&row.row_key)
            .map_err(|e| StorageError::Corrupt(format!("row_key '{}': {e}", row.row_key)))?;
        let status = JobStatus::from_name(&row.status)
            .map_err(|e| StorageError::Corrupt(format!("job {job_id}: {e}")))?;
        let extra = match row.extra {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(StorageError::Corrupt(format!(
                    "job {job_id}: extra must be a JSON object, got {other}"
                )))
            }
        };
        if let Some(field) = shadowed_field(&extra) {
            return Err(StorageError::Corrupt(format!(
                "job {job_id}: extra field '{field}' shadows a fixed field"
            )));
        }

        Ok(Self {
            partition: row.partition_key,
            job_id,
            status,
            created: row.created,
            image_url: row.image_url,
            extra,
        })
    }
}

/// Status store over the `jobstatus` table.
#[derive(Clone)]
pub struct PgStatusStore {
    pool: DbPool,
}

impl PgStatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> Result<(), StorageError> {
        ensure_persistable(record)?;

        sqlx::query(
            "INSERT INTO jobstatus (partition_key, row_key, status, created, image_url, extra) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (partition_key, row_key) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 created = EXCLUDED.created, \
                 image_url = EXCLUDED.image_url, \
                 extra = EXCLUDED.extra, \
                 updated_at = NOW()",
        )
        .bind(&record.partition)
        .bind(record.job_id.as_str())
        .bind(record.status.as_str())
        .bind(record.created)
        .bind(&record.image_url)
        .bind(serde_json::Value::Object(record.extra.clone()))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        tracing::debug!(job_id = %record.job_id, status = %record.status, "Status record written");
        Ok(())
    }

    async fn get(&self, partition: &str, job_id: &JobId) -> Result<Lookup, StorageError> {
        let query =
            format!("SELECT {COLUMNS} FROM jobstatus WHERE partition_key = $1 AND row_key = $2");
        let row = sqlx::query_as::<_, JobStatusRow>(&query)
            .bind(partition)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Ok(Lookup::Found(row.try_into()?)),
            None => Ok(Lookup::NotFound),
        }
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        crate::health_check(&self.pool).await.map_err(unavailable)
    }
}

// ---------------------------------------------------------------------------
// Work queue
// ---------------------------------------------------------------------------

/// Work queue over the `queue_messages` table.
#[derive(Clone)]
pub struct PgWorkQueue {
    pool: DbPool,
    queue_name: String,
}

impl PgWorkQueue {
    /// Queue bound to [`PROCESSING_QUEUE`].
    pub fn new(pool: DbPool) -> Self {
        Self::named(pool, PROCESSING_QUEUE)
    }

    pub fn named(pool: DbPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn send(&self, message: &WorkMessage) -> Result<(), StorageError> {
        let payload =
            serde_json::to_value(message).map_err(|e| StorageError::Rejected(e.to_string()))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO queue_messages (queue_name, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(&self.queue_name)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        tracing::debug!(
            job_id = %message.job_id,
            queue = %self.queue_name,
            message_id = id,
            "Work message enqueued",
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        crate::health_check(&self.pool).await.map_err(unavailable)
    }
}
