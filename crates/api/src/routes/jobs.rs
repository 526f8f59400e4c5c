//! Route definitions for job submission and status polling.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/api`.
///
/// ```text
/// POST   /SubmitJob       -> submit_job
/// GET    /GetJobStatus    -> get_job_status
/// POST   /GetJobStatus    -> get_job_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/SubmitJob", post(jobs::submit_job))
        .route(
            "/GetJobStatus",
            get(jobs::get_job_status).post(jobs::get_job_status),
        )
}
