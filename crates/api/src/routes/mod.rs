pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /SubmitJob                 submit an image job (POST)
/// /GetJobStatus              poll job status (GET ?job_id=, POST {job_id})
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(jobs::router())
}
