//! Handlers for job submission and status polling.
//!
//! Submission writes a `pending` status record and then enqueues a work
//! message. The two writes are not atomic: if the queue send fails the
//! record stays `pending` with no work behind it.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imagejob_core::error::CoreError;
use imagejob_core::job::{
    JobId, JobStatus, JobStatusRecord, SubmitJobRequest, WorkMessage, JOB_PARTITION,
};
use imagejob_core::storage::Lookup;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Message returned when no job ID could be found in the request.
pub const MISSING_JOB_ID_MESSAGE: &str = "Please provide job_id parameter";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Successful submission response.
#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub success: bool,
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    /// Where to poll for progress.
    pub status_url: String,
}

/// Returned with 404 when a job's status cannot be determined.
#[derive(Debug, Serialize)]
pub struct UnknownJobResponse {
    /// The ID as supplied, which may not be a valid [`JobId`].
    pub job_id: String,
    pub status: JobStatus,
    pub error: String,
}

/// `job_id` as a query parameter or JSON body field.
#[derive(Debug, Default, Deserialize)]
pub struct JobIdParams {
    pub job_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/SubmitJob
///
/// Validate the request, then write a `pending` status record and enqueue
/// `{job_id, image_url}` for the worker. Storage health is probed first so
/// an unreachable backend fails the request before any write.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> AppResult<Json<SubmitJobResponse>> {
    let Json(request) =
        payload.map_err(|e| CoreError::Validation(format!("Invalid JSON: {}", e.body_text())))?;
    let job = request.validate()?;

    state.status_store.health_check().await?;
    state.work_queue.health_check().await?;

    let record = JobStatusRecord::pending(job.job_id, job.image_url);
    state.status_store.put(&record).await?;

    if let Err(e) = state.work_queue.send(&WorkMessage::from(&record)).await {
        tracing::warn!(
            job_id = %record.job_id,
            "Queue send failed after status write; record left pending without work",
        );
        return Err(e.into());
    }

    let status_url = state.config.deployment.status_url(&record.job_id);

    tracing::info!(
        job_id = %record.job_id,
        image_url = %record.image_url,
        "Job submitted",
    );

    Ok(Json(SubmitJobResponse {
        success: true,
        job_id: record.job_id,
        status: record.status,
        message: "Job submitted for processing".into(),
        status_url: status_url.into(),
    }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET|POST /api/GetJobStatus
///
/// The job ID is taken from the query string, falling back to a JSON body.
/// A found record is returned verbatim. A missing record and a failed
/// lookup both produce 404 with `status: "unknown"`; the lookup failure
/// itself is only logged. An ID that could never have been stored is
/// reported the same way as a missing record.
pub async fn get_job_status(
    State(state): State<AppState>,
    query: Result<Query<JobIdParams>, QueryRejection>,
    body: Bytes,
) -> AppResult<Response> {
    let raw = resolve_job_id(query.ok().map(|Query(q)| q), &body)?;

    let job_id = match JobId::parse(&raw) {
        Ok(job_id) => job_id,
        Err(e) => {
            tracing::debug!(job_id = %raw, error = %e, "Status requested for unstorable job ID");
            return Ok(unknown_job(raw, "job not found"));
        }
    };

    match state.status_store.get(JOB_PARTITION, &job_id).await {
        Ok(Lookup::Found(record)) => Ok(Json(record).into_response()),
        Ok(Lookup::NotFound) => {
            tracing::debug!(job_id = %job_id, "No status record for job");
            Ok(unknown_job(job_id.into(), "job not found"))
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Status lookup failed");
            Ok(unknown_job(job_id.into(), "status store unavailable"))
        }
    }
}

/// Pick the job ID from the query, else from the body. Blank counts as absent.
fn resolve_job_id(query: Option<JobIdParams>, body: &[u8]) -> AppResult<String> {
    let from_query = query.and_then(|q| q.job_id);
    let raw = match from_query.filter(|id| !id.trim().is_empty()) {
        Some(id) => Some(id),
        None if body.is_empty() => None,
        None => serde_json::from_slice::<JobIdParams>(body)
            .ok()
            .and_then(|p| p.job_id),
    };

    match raw.filter(|id| !id.trim().is_empty()) {
        Some(id) => Ok(id),
        None => Err(AppError::BadRequest(MISSING_JOB_ID_MESSAGE.into())),
    }
}

fn unknown_job(job_id: String, reason: &str) -> Response {
    let body = UnknownJobResponse {
        job_id,
        status: JobStatus::Unknown,
        error: format!("Could not retrieve job status: {reason}"),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
