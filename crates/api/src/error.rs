use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagejob_core::error::CoreError;
use imagejob_core::storage::StorageError;
use serde::Serialize;

use crate::config::ConfigError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`StorageError`] for backend
/// failures. Implements [`IntoResponse`] to produce consistent JSON error
/// bodies. Backend and internal failure text is logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imagejob_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The status store or work queue failed.
    #[error("Dependency error: {0}")]
    Dependency(#[from] StorageError),

    /// Required deployment settings are missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error, details) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "Invalid request".to_string(),
                    Some(msg.clone()),
                ),
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                    None,
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        INTERNAL_MESSAGE.to_string(),
                        None,
                    )
                }
            },

            // --- Storage errors ---
            AppError::Dependency(err) => {
                tracing::error!(error = %err, "Storage dependency failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DEPENDENCY_ERROR",
                    "A storage dependency is unavailable".to_string(),
                    None,
                )
            }

            // --- Configuration errors (variable names only) ---
            AppError::Configuration(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Service is misconfigured".to_string(),
                    Some(err.to_string()),
                )
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_MESSAGE.to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            error,
            code,
            details,
        };

        (status, axum::Json(body)).into_response()
    }
}
