// src/handlers/submission.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::submission::{EvaluationMode, SubmitCodeRequest},
    services::{EvaluationRequest, Evaluator},
    utils::jwt::Claims,
};

/// Grades a submission inside a running exam attempt.
pub async fn submit_exam_code(
    State(evaluator): State<Evaluator>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let request = EvaluationRequest {
        student_id: claims.student_id()?,
        attempt_id: Some(attempt_id),
        problem_id: payload.problem_id,
        language_id: payload.language_id,
        source_code: payload.source_code,
        mode: EvaluationMode::Exam,
    };

    let response = evaluator.evaluate(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Grades a practice submission. No attempt, no stats.
pub async fn submit_practice_code(
    State(evaluator): State<Evaluator>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let request = EvaluationRequest {
        student_id: claims.student_id()?,
        attempt_id: None,
        problem_id: payload.problem_id,
        language_id: payload.language_id,
        source_code: payload.source_code,
        mode: EvaluationMode::Practice,
    };

    let response = evaluator.evaluate(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
