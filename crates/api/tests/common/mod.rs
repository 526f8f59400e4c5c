#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use imagejob_api::config::{DeploymentConfig, ServerConfig, StorageBackend};
use imagejob_api::router::build_app_router;
use imagejob_api::state::AppState;
use imagejob_core::job::{JobId, JobStatusRecord, WorkMessage};
use imagejob_core::storage::{Lookup, StatusStore, StorageError, WorkQueue};
use imagejob_db::memory::{InMemoryStatusStore, InMemoryWorkQueue};
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults and in-memory storage.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        storage: StorageBackend::Memory,
        deployment: DeploymentConfig {
            subscription_id: "test-subscription".into(),
            resource_group: "test-rg".into(),
            function_app_name: "imagejobs-test".into(),
            container_image: "registry.example.com/worker:test".into(),
            location: "westeurope".into(),
            public_base_url: "https://jobs.example.com".parse().unwrap(),
        },
    }
}

/// Application wired to in-memory backends the test can inspect.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStatusStore>,
    pub queue: Arc<InMemoryWorkQueue>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStatusStore::new());
        let queue = Arc::new(InMemoryWorkQueue::new());
        let state = AppState::new(test_config(), store.clone(), queue.clone());
        Self {
            state,
            store,
            queue,
        }
    }

    /// A fresh router over the shared state (each request consumes one).
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone())
    }
}

/// Build an app over arbitrary backends.
pub fn build_app_with(
    status_store: Arc<dyn StatusStore>,
    work_queue: Arc<dyn WorkQueue>,
) -> Router {
    build_app_router(AppState::new(test_config(), status_store, work_queue))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, json.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Failing backends
// ---------------------------------------------------------------------------

fn down() -> StorageError {
    StorageError::Unavailable("connection refused by 10.0.0.5:5432".into())
}

/// Status store whose every operation fails.
pub struct UnreachableStore;

#[async_trait]
impl StatusStore for UnreachableStore {
    async fn put(&self, _record: &JobStatusRecord) -> Result<(), StorageError> {
        Err(down())
    }

    async fn get(&self, _partition: &str, _job_id: &JobId) -> Result<Lookup, StorageError> {
        Err(down())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Err(down())
    }
}

/// Queue that reports healthy but rejects every send.
pub struct RejectingQueue;

#[async_trait]
impl WorkQueue for RejectingQueue {
    async fn send(&self, _message: &WorkMessage) -> Result<(), StorageError> {
        Err(down())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
