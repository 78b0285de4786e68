// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::{error::AppError, services::AttemptService, utils::jwt::Claims};

/// Starts (or re-enters) the caller's attempt at an exam.
pub async fn start_exam(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let attempt = attempts.start(exam_id, student_id, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Liveness ping. Does not extend the deadline.
pub async fn heartbeat(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let attempt = attempts.heartbeat(attempt_id, student_id, Utc::now()).await?;
    Ok(Json(attempt))
}

/// Finishes the attempt and returns the computed exam result.
pub async fn submit_exam(
    State(attempts): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let result = attempts.submit(attempt_id, student_id, Utc::now()).await?;
    Ok(Json(result))
}
