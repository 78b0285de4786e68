// src/services/stats.rs

use crate::{
    error::AppError,
    models::stats::{GroupProblemStats, StatsSample, StudentOverallStats, StudentProblemStats},
    store::StoreTx,
};

/// What a single submission changed about a student's standing on a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub is_first_attempt: bool,
    pub first_solve: bool,
}

/// `(old_mean * old_count + value) / (old_count + 1)`
pub fn running_mean(old_mean: f64, old_count: i64, value: f64) -> f64 {
    (old_mean * old_count as f64 + value) / (old_count as f64 + 1.0)
}

pub fn apply_student_attempt(stats: &mut StudentProblemStats, accepted: bool) -> AttemptOutcome {
    let outcome = AttemptOutcome {
        is_first_attempt: stats.attempts == 0,
        first_solve: accepted && !stats.solved,
    };
    stats.attempts += 1;
    if accepted {
        stats.solved = true;
    }
    outcome
}

pub fn apply_group_attempt(
    stats: &mut GroupProblemStats,
    outcome: AttemptOutcome,
    runtime_ms: f64,
    memory_kb: f64,
) {
    if outcome.is_first_attempt {
        stats.attempted_count += 1;
    }
    if outcome.first_solve {
        stats.accepted_count += 1;
    }
    stats.avg_runtime_ms = running_mean(stats.avg_runtime_ms, stats.total_attempts, runtime_ms);
    stats.avg_memory_kb = running_mean(stats.avg_memory_kb, stats.total_attempts, memory_kb);
    stats.total_attempts += 1;
}

pub fn apply_overall_attempt(stats: &mut StudentOverallStats) {
    stats.total_attempts += 1;
}

pub fn apply_exam_finalized(stats: &mut StudentOverallStats, total_score: i32) {
    stats.exams_taken += 1;
    stats.total_score += i64::from(total_score);
    stats.average_score = stats.total_score as f64 / stats.exams_taken as f64;
}

/// Folds one graded submission into the aggregates of every group in
/// `group_ids`.
pub async fn record_submission(
    tx: &mut dyn StoreTx,
    group_ids: &[i64],
    sample: &StatsSample,
) -> Result<(), AppError> {
    for &group_id in group_ids {
        let mut student = tx
            .lock_student_problem_stats(sample.student_id, sample.problem_id, group_id)
            .await?;
        let mut group = tx
            .lock_group_problem_stats(group_id, sample.problem_id)
            .await?;
        let mut overall = tx.lock_overall_stats(sample.student_id, group_id).await?;

        let outcome = apply_student_attempt(&mut student, sample.accepted);
        apply_group_attempt(&mut group, outcome, sample.runtime_ms, sample.memory_kb);
        apply_overall_attempt(&mut overall);

        tx.save_student_problem_stats(&student).await?;
        tx.save_group_problem_stats(&group).await?;
        tx.save_overall_stats(&overall).await?;

        tracing::debug!(
            group_id,
            student_id = sample.student_id,
            problem_id = sample.problem_id,
            first_attempt = outcome.is_first_attempt,
            first_solve = outcome.first_solve,
            "Stats updated"
        );
    }
    Ok(())
}

/// Adds a finished exam to the student's overall aggregates.
pub async fn record_exam_result(
    tx: &mut dyn StoreTx,
    group_ids: &[i64],
    student_id: i64,
    total_score: i32,
) -> Result<(), AppError> {
    for &group_id in group_ids {
        let mut overall = tx.lock_overall_stats(student_id, group_id).await?;
        apply_exam_finalized(&mut overall, total_score);
        tx.save_overall_stats(&overall).await?;
    }
    Ok(())
}
