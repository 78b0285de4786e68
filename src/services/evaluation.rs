// src/services/evaluation.rs

// No transaction is held while the judge runs. The attempt is checked once
// up front and again, under lock, right before persisting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;

use crate::{
    config::PollPolicy,
    error::AppError,
    judge::{JudgeCase, JudgeClient, JudgeRun, wait_for_result},
    models::{
        complexity::ComplexityVerdict,
        stats::StatsSample,
        submission::{
            CaseVerdict, EvaluationMode, EvaluationResponse, NewSubmission, SubmissionStatus,
        },
    },
    services::{
        attempts::AttemptService, complexity::ComplexityClassifier, final_selector, stats,
    },
    store::Store,
    utils::source::{assemble_source, sanitize_source},
};

/// Score multiplier applied in exam mode when the solution scales worse
/// than expected.
pub const EXAM_COMPLEXITY_PENALTY: f64 = 0.5;

/// One grading request, already authenticated.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub student_id: i64,
    pub attempt_id: Option<i64>,
    pub problem_id: i64,
    pub language_id: i32,
    pub source_code: String,
    pub mode: EvaluationMode,
}

/// Overall status by fixed precedence: compile error, time limit, runtime
/// error, then pass count.
pub fn overall_status(verdicts: &[CaseVerdict]) -> SubmissionStatus {
    let any = |v: CaseVerdict| verdicts.contains(&v);
    let passed = verdicts
        .iter()
        .filter(|v| **v == CaseVerdict::Accepted)
        .count();

    if any(CaseVerdict::CompilationError) {
        SubmissionStatus::CompileError
    } else if any(CaseVerdict::TimeLimitExceeded) {
        SubmissionStatus::TimeLimit
    } else if any(CaseVerdict::RuntimeError) {
        SubmissionStatus::RuntimeError
    } else if !verdicts.is_empty() && passed == verdicts.len() {
        SubmissionStatus::Accepted
    } else if passed > 0 {
        SubmissionStatus::Partial
    } else {
        SubmissionStatus::WrongAnswer
    }
}

/// `round(passed / total * 100)`, 0 when there is nothing to pass.
pub fn functional_score(passed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((passed as f64 / total as f64) * 100.0).round() as i32
}

/// Folds a complexity verdict into the functional outcome.
///
/// Exam submissions keep their status and lose half the score. Practice
/// submissions keep their score and are marked `BAD_SCALING`.
pub fn apply_complexity(
    mode: EvaluationMode,
    status: SubmissionStatus,
    score: i32,
    verdict: &ComplexityVerdict,
) -> (SubmissionStatus, i32) {
    if verdict.passed {
        return (status, score);
    }
    match mode {
        EvaluationMode::Exam => (
            status,
            (f64::from(score) * EXAM_COMPLEXITY_PENALTY).round() as i32,
        ),
        EvaluationMode::Practice => (SubmissionStatus::BadScaling, score),
    }
}

/// Sum of per-case time in milliseconds and peak per-case memory.
pub fn resource_usage(runs: &[JudgeRun]) -> (i64, i64) {
    let seconds: f64 = runs
        .iter()
        .filter_map(|r| r.time_seconds)
        .filter(|t| t.is_finite() && *t > 0.0)
        .sum();
    let memory = runs.iter().filter_map(|r| r.memory_kb).max().unwrap_or(0);
    ((seconds * 1000.0).round() as i64, memory.max(0))
}

#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn Store>,
    judge: Arc<dyn JudgeClient>,
    attempts: AttemptService,
    classifier: ComplexityClassifier,
    poll: PollPolicy,
    max_source_bytes: usize,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn Store>,
        judge: Arc<dyn JudgeClient>,
        poll: PollPolicy,
        max_source_bytes: usize,
    ) -> Self {
        Self {
            attempts: AttemptService::new(store.clone()),
            classifier: ComplexityClassifier::new(judge.clone()),
            store,
            judge,
            poll,
            max_source_bytes,
        }
    }

    pub async fn evaluate(
        &self,
        req: EvaluationRequest,
        now: DateTime<Utc>,
    ) -> Result<EvaluationResponse, AppError> {
        tracing::info!(
            student_id = req.student_id,
            problem_id = req.problem_id,
            attempt_id = ?req.attempt_id,
            mode = ?req.mode,
            "Evaluating submission"
        );

        if req.source_code.trim().is_empty() {
            return Err(AppError::Validation("source code is empty".to_string()));
        }
        if req.source_code.len() > self.max_source_bytes {
            return Err(AppError::Validation(format!(
                "source code is {} bytes, limit is {}",
                req.source_code.len(),
                self.max_source_bytes
            )));
        }

        let attempt_id = self.check_eligibility(&req, now).await?;

        let problem = self
            .store
            .problem(req.problem_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("problem {} not found", req.problem_id)))?;
        let test_cases = self.store.test_cases(req.problem_id).await?;
        if test_cases.is_empty() {
            return Err(AppError::NotFound(format!(
                "problem {} has no hidden test cases",
                req.problem_id
            )));
        }
        let template = self
            .store
            .template(req.language_id, req.problem_id)
            .await?
            .unwrap_or_default();

        let code = assemble_source(
            &template.header,
            &sanitize_source(&req.source_code),
            &template.footer,
        );

        // Functional grading: one batch, polled concurrently.
        let cases: Vec<JudgeCase> = test_cases
            .iter()
            .map(|tc| JudgeCase {
                language_id: req.language_id,
                source_code: code.clone(),
                stdin: tc.input.clone(),
                expected_output: Some(tc.expected_output.clone()),
            })
            .collect();

        let tokens = self.judge.submit_batch(&cases).await.inspect_err(|e| {
            tracing::error!(problem_id = req.problem_id, "Judge batch submission failed: {}", e)
        })?;
        let runs = try_join_all(
            tokens
                .iter()
                .map(|token| wait_for_result(self.judge.as_ref(), token, self.poll)),
        )
        .await?;

        let verdicts: Vec<CaseVerdict> = runs.iter().map(JudgeRun::verdict).collect();
        let passed = verdicts
            .iter()
            .filter(|v| **v == CaseVerdict::Accepted)
            .count();
        let mut status = overall_status(&verdicts);
        let mut score = functional_score(passed, verdicts.len());
        let (execution_time_ms, memory_kb) = resource_usage(&runs);

        // Complexity grading only for fully correct code.
        let mut complexity = None;
        if status == SubmissionStatus::Accepted {
            if let Some(spec) = &problem.probe_spec {
                let verdict = self.classifier.measure(spec, req.language_id, &code).await?;
                if !verdict.passed {
                    tracing::warn!(
                        problem_id = req.problem_id,
                        student_id = req.student_id,
                        observed = ?verdict.observed,
                        expected = %verdict.expected,
                        "Solution scales worse than expected"
                    );
                }
                (status, score) = apply_complexity(req.mode, status, score, &verdict);
                complexity = Some(verdict);
            }
        }

        let new_submission = NewSubmission {
            problem_id: req.problem_id,
            student_id: req.student_id,
            attempt_id,
            source_code: req.source_code,
            language_id: req.language_id,
            status,
            passed_count: passed as i32,
            total_count: verdicts.len() as i32,
            score: score.clamp(0, 100),
            execution_time_ms,
            memory_kb,
            observed_complexity: complexity.as_ref().and_then(|c| c.observed),
            expected_complexity: complexity.as_ref().map(|c| c.expected),
            created_at: now,
        };

        // Persist atomically.
        let mut tx = self.store.begin().await?;
        if let Some(attempt_id) = attempt_id {
            self.attempts
                .gate(tx.as_mut(), attempt_id, req.student_id, now)
                .await?;
        }

        let mut submission = tx.insert_submission(new_submission).await?;
        submission.is_final = final_selector::select_final(tx.as_mut(), &submission).await?;

        if let Some(attempt_id) = attempt_id {
            let attempt = tx
                .lock_attempt(attempt_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("attempt {} not found", attempt_id)))?;
            let groups = self
                .store
                .linked_groups(req.student_id, attempt.exam_id)
                .await?;
            let sample = StatsSample {
                student_id: req.student_id,
                problem_id: req.problem_id,
                accepted: submission.status.is_accepted(),
                runtime_ms: submission.execution_time_ms as f64,
                memory_kb: submission.memory_kb as f64,
            };
            stats::record_submission(tx.as_mut(), &groups, &sample).await?;
        }

        tx.commit().await?;

        tracing::info!(
            submission_id = submission.id,
            student_id = submission.student_id,
            problem_id = submission.problem_id,
            status = %submission.status,
            score = submission.score,
            is_final = submission.is_final,
            "Submission graded"
        );

        Ok(EvaluationResponse {
            submission,
            case_verdicts: verdicts,
            complexity,
        })
    }

    /// Returns the attempt the submission counts towards, if any.
    async fn check_eligibility(
        &self,
        req: &EvaluationRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, AppError> {
        match req.mode {
            EvaluationMode::Practice => {
                if req.attempt_id.is_some() {
                    return Err(AppError::Validation(
                        "practice submissions cannot reference an exam attempt".to_string(),
                    ));
                }
                Ok(None)
            }
            EvaluationMode::Exam => {
                let attempt_id = req.attempt_id.ok_or_else(|| {
                    AppError::Validation("exam submissions require an attempt".to_string())
                })?;

                // Read-only unless the attempt has expired, in which case the
                // gate commits the forced submission itself.
                let mut tx = self.store.begin().await?;
                let attempt = self
                    .attempts
                    .gate(tx.as_mut(), attempt_id, req.student_id, now)
                    .await?;
                drop(tx);

                let problems = self.store.exam_problem_ids(attempt.exam_id).await?;
                if !problems.contains(&req.problem_id) {
                    return Err(AppError::NotFound(format!(
                        "problem {} is not part of exam {}",
                        req.problem_id, attempt.exam_id
                    )));
                }
                Ok(Some(attempt_id))
            }
        }
    }
}
