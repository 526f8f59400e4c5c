//! Storage capabilities the HTTP handlers depend on.
//!
//! Handlers only see these traits; concrete backends (PostgreSQL,
//! in-memory) are chosen at startup.

use async_trait::async_trait;

use crate::job::{JobId, JobStatusRecord, WorkMessage};

/// Failure talking to a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation failed.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The backend refused the value being written.
    #[error("Rejected write: {0}")]
    Rejected(String),
}

/// Outcome of a status lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(JobStatusRecord),
    NotFound,
}

impl Lookup {
    pub fn into_option(self) -> Option<JobStatusRecord> {
        match self {
            Self::Found(record) => Some(record),
            Self::NotFound => None,
        }
    }
}

impl From<Option<JobStatusRecord>> for Lookup {
    fn from(value: Option<JobStatusRecord>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Key-value store of job status records keyed by `(partition, job_id)`.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or replace the record at `(record.partition, record.job_id)`.
    ///
    /// Unconditional: the last writer wins.
    async fn put(&self, record: &JobStatusRecord) -> Result<(), StorageError>;

    /// Fetch the record at `(partition, job_id)`.
    async fn get(&self, partition: &str, job_id: &JobId) -> Result<Lookup, StorageError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Append-only FIFO channel to the external worker.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append one message to the queue.
    async fn send(&self, message: &WorkMessage) -> Result<(), StorageError>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Reject records that must never reach a backend.
pub fn ensure_persistable(record: &JobStatusRecord) -> Result<(), StorageError> {
    if !record.status.is_persistable() {
        return Err(StorageError::Rejected(format!(
            "status '{}' cannot be stored (job {})",
            record.status, record.job_id
        )));
    }
    if let Some(field) = record.shadowed_field() {
        return Err(StorageError::Rejected(format!(
            "extra field '{field}' shadows a fixed field (job {})",
            record.job_id
        )));
    }
    Ok(())
}
