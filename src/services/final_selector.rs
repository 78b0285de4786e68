// src/services/final_selector.rs

use crate::{
    error::AppError,
    models::submission::{FinalKey, Submission},
    store::StoreTx,
};

/// Whether a submission passing `candidate_passed` cases replaces `current`.
/// Ties go to the newer submission.
pub fn supersedes(candidate_passed: i32, current: Option<&Submission>) -> bool {
    match current {
        None => true,
        Some(prev) => candidate_passed >= prev.passed_count,
    }
}

/// Decides whether `submission` becomes the final one for its
/// (student, problem, attempt) slot, flipping the previous holder in the
/// same transaction. Returns true when `submission` was promoted.
pub async fn select_final(tx: &mut dyn StoreTx, submission: &Submission) -> Result<bool, AppError> {
    let key = FinalKey::from(submission);
    let current = tx.lock_final_submission(key).await?;

    if !supersedes(submission.passed_count, current.as_ref()) {
        return Ok(false);
    }

    if let Some(prev) = current.filter(|prev| prev.id != submission.id) {
        tx.set_final(prev.id, false).await?;
        tracing::debug!(
            demoted = prev.id,
            promoted = submission.id,
            "Final submission replaced"
        );
    }
    tx.set_final(submission.id, true).await?;

    Ok(true)
}
