// src/services/attempts.rs

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::AppError,
    models::attempt::{AttemptStatus, ExamAttempt, ExamResult},
    services::stats,
    store::{Store, StoreTx},
};

/// Averages the best score of every exam problem. Problems without a
/// submission count as 0; an exam without problems scores 0.
pub fn total_score(problem_ids: &[i64], best: &HashMap<i64, i32>) -> i32 {
    if problem_ids.is_empty() {
        return 0;
    }
    let sum: i64 = problem_ids
        .iter()
        .map(|id| i64::from(best.get(id).copied().unwrap_or(0)))
        .sum();
    let avg = (sum as f64 / problem_ids.len() as f64).round() as i32;
    avg.clamp(0, 100)
}

fn advance(attempt: &mut ExamAttempt, next: AttemptStatus) -> Result<(), AppError> {
    if !attempt.status.can_advance_to(next) {
        return Err(AppError::InvalidState(format!(
            "attempt {} cannot move from {} to {}",
            attempt.id, attempt.status, next
        )));
    }
    attempt.status = next;
    Ok(())
}

/// Exam Attempt State Machine.
///
/// Expiry is checked lazily: every gated operation compares `now` with
/// `expires_at` and force-submits an overdue attempt before failing with
/// `ExamExpired`.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// NOT_STARTED -> IN_PROGRESS, creating the attempt on first access.
    /// Re-entering a running attempt only refreshes the heartbeat.
    pub async fn start(
        &self,
        exam_id: i64,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt, AppError> {
        let exam = self
            .store
            .exam(exam_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("exam {} not found", exam_id)))?;

        let duration = TimeDelta::try_minutes(exam.duration_minutes)
            .filter(|d| *d > TimeDelta::zero())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "exam {} has an invalid duration of {} minutes",
                    exam_id, exam.duration_minutes
                ))
            })?;

        let mut tx = self.store.begin().await?;
        let mut attempt = tx.lock_or_insert_attempt(exam_id, student_id).await?;

        if attempt.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "attempt {} is already {}",
                attempt.id, attempt.status
            )));
        }

        if attempt.status == AttemptStatus::NotStarted {
            advance(&mut attempt, AttemptStatus::InProgress)?;
            attempt.started_at = Some(now);
            attempt.expires_at = Some(now + duration);
            attempt.last_heartbeat_at = Some(now);
            tracing::info!(
                attempt_id = attempt.id,
                exam_id,
                student_id,
                "Exam attempt started"
            );
        } else if attempt.is_expired_at(now) {
            return self.expire(tx.as_mut(), attempt, now).await;
        } else {
            attempt.last_heartbeat_at = Some(now);
        }

        tx.update_attempt(&attempt).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    /// Records liveness. Never moves `expires_at`.
    pub async fn heartbeat(
        &self,
        attempt_id: i64,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt, AppError> {
        let mut tx = self.store.begin().await?;
        let mut attempt = self.gate(tx.as_mut(), attempt_id, student_id, now).await?;

        attempt.last_heartbeat_at = Some(now);
        tx.update_attempt(&attempt).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    /// IN_PROGRESS -> SUBMITTED with the final score.
    pub async fn submit(
        &self,
        attempt_id: i64,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamResult, AppError> {
        let mut tx = self.store.begin().await?;
        let mut attempt = self.gate(tx.as_mut(), attempt_id, student_id, now).await?;

        let result = self
            .finalize(tx.as_mut(), &mut attempt, AttemptStatus::Submitted, now)
            .await?;
        tx.commit().await?;

        tracing::info!(
            attempt_id,
            student_id,
            total_score = result.total_score,
            "Exam attempt submitted"
        );
        Ok(result)
    }

    /// Eligibility check for grading. Locks the attempt for the rest of `tx`.
    ///
    /// An overdue attempt is auto-submitted and `tx` is committed before
    /// `ExamExpired` is returned, so callers must not reuse `tx` on error.
    pub async fn gate(
        &self,
        tx: &mut dyn StoreTx,
        attempt_id: i64,
        student_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt, AppError> {
        let attempt = tx
            .lock_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt {} not found", attempt_id)))?;

        if attempt.student_id != student_id {
            return Err(AppError::Forbidden(format!(
                "attempt {} belongs to another student",
                attempt_id
            )));
        }
        if attempt.status != AttemptStatus::InProgress {
            return Err(AppError::InvalidState(format!(
                "attempt {} is {}, not IN_PROGRESS",
                attempt_id, attempt.status
            )));
        }

        if attempt.is_expired_at(now) {
            return self.expire(tx, attempt, now).await;
        }

        Ok(attempt)
    }

    /// Forces an overdue attempt to AUTO_SUBMITTED, commits, and fails.
    async fn expire(
        &self,
        tx: &mut dyn StoreTx,
        mut attempt: ExamAttempt,
        now: DateTime<Utc>,
    ) -> Result<ExamAttempt, AppError> {
        tracing::warn!(
            attempt_id = attempt.id,
            student_id = attempt.student_id,
            "Exam attempt expired, auto-submitting"
        );
        let result = self
            .finalize(tx, &mut attempt, AttemptStatus::AutoSubmitted, now)
            .await?;
        tx.commit().await?;
        Err(AppError::ExamExpired(format!(
            "attempt {} expired and was auto-submitted with score {}",
            attempt.id, result.total_score
        )))
    }

    async fn finalize(
        &self,
        tx: &mut dyn StoreTx,
        attempt: &mut ExamAttempt,
        status: AttemptStatus,
        now: DateTime<Utc>,
    ) -> Result<ExamResult, AppError> {
        advance(attempt, status)?;

        let problem_ids = self.store.exam_problem_ids(attempt.exam_id).await?;
        let best = tx.best_scores(attempt.id).await?;
        let score = total_score(&problem_ids, &best);

        attempt.submitted_at = Some(now);
        attempt.total_score = Some(score);
        tx.update_attempt(attempt).await?;

        let result = ExamResult {
            attempt_id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            total_score: score,
            auto_submitted: status == AttemptStatus::AutoSubmitted,
            submitted_at: now,
        };
        tx.insert_exam_result(&result).await?;

        let groups = self
            .store
            .linked_groups(attempt.student_id, attempt.exam_id)
            .await?;
        stats::record_exam_result(tx, &groups, attempt.student_id, score).await?;

        Ok(result)
    }
}
