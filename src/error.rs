// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every failure of the grading pipeline ends up as one of these variants
/// and is surfaced to the caller; nothing is swallowed.
#[derive(Debug)]
pub enum AppError {
    // 400 Malformed or missing required input
    Validation(String),

    // 401 Missing or invalid session token
    AuthError(String),

    // 403 Attempt not owned by caller
    Forbidden(String),

    // 404 Problem, test cases, exam or attempt absent
    NotFound(String),

    // 409 Attempt not IN_PROGRESS
    InvalidState(String),

    // 410 Lazy expiry fired during a gating check
    ExamExpired(String),

    // 422 Complexity timings too noisy to classify
    UnstableMeasurement(String),

    // 502 Judge or network failure below the application layer
    ExternalService(String),

    // 504 Judge polling exhausted
    Timeout(String),

    // 500
    InternalServerError(String),
}

impl AppError {
    /// Short machine-readable tag used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::AuthError(_) => "auth",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::ExamExpired(_) => "exam_expired",
            AppError::UnstableMeasurement(_) => "unstable_measurement",
            AppError::ExternalService(_) => "external_service",
            AppError::Timeout(_) => "timeout",
            AppError::InternalServerError(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::ExamExpired(_) => StatusCode::GONE,
            AppError::UnstableMeasurement(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "validation error: {}", msg),
            AppError::AuthError(msg) => write!(f, "unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "not found: {}", msg),
            AppError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            AppError::ExamExpired(msg) => write!(f, "exam expired: {}", msg),
            AppError::UnstableMeasurement(msg) => write!(f, "unstable measurement: {}", msg),
            AppError::ExternalService(msg) => write!(f, "external service error: {}", msg),
            AppError::Timeout(msg) => write!(f, "timeout: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let error_message = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::ExternalService(msg) => {
                tracing::error!("Judge failure: {}", msg);
                msg
            }
            AppError::Validation(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidState(msg)
            | AppError::ExamExpired(msg)
            | AppError::UnstableMeasurement(msg)
            | AppError::Timeout(msg) => msg,
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Transport-level judge failures. These are never retried outside the poll loop.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ExternalService(format!("judge request timed out: {}", err))
        } else {
            AppError::ExternalService(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::ExternalService(format!("judge returned malformed base64: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
