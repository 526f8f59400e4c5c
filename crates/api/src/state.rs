use std::sync::Arc;

use imagejob_core::storage::{StatusStore, WorkQueue};
use imagejob_db::memory::{InMemoryStatusStore, InMemoryWorkQueue};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, validated at startup.
    pub config: Arc<ServerConfig>,
    /// Job status records keyed by `(partition, job_id)`.
    pub status_store: Arc<dyn StatusStore>,
    /// Queue consumed by the external image worker.
    pub work_queue: Arc<dyn WorkQueue>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        status_store: Arc<dyn StatusStore>,
        work_queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            status_store,
            work_queue,
        }
    }

    /// State backed by fresh in-memory stores.
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryStatusStore::new()),
            Arc::new(InMemoryWorkQueue::new()),
        )
    }
}
