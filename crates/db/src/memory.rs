//! In-process [`StatusStore`] and [`WorkQueue`].
//!
//! Selected with `STORAGE_BACKEND=memory`. State lives only as long as the
//! process; tests use the inspection helpers to assert on side effects.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use imagejob_core::job::{JobId, JobStatusRecord, WorkMessage};
use imagejob_core::storage::{ensure_persistable, Lookup, StatusStore, StorageError, WorkQueue};
use tokio::sync::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Status store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<(String, JobId), JobStatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> Result<(), StorageError> {
        ensure_persistable(record)?;

        let key = (record.partition.clone(), record.job_id.clone());
        self.records.write().await.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, partition: &str, job_id: &JobId) -> Result<Lookup, StorageError> {
        let key = (partition.to_string(), job_id.clone());
        Ok(self.records.read().await.get(&key).cloned().into())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Work queue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    messages: Mutex<VecDeque<WorkMessage>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every queued message, oldest first.
    pub async fn snapshot(&self) -> Vec<WorkMessage> {
        self.messages.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn send(&self, message: &WorkMessage) -> Result<(), StorageError> {
        self.messages.lock().await.push_back(message.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
