// src/judge/mod.rs

pub mod judge0;

use async_trait::async_trait;

use crate::{config::PollPolicy, error::AppError, models::submission::CaseVerdict};

pub use judge0::Judge0Client;

/// Highest status id that still means "queued or running".
pub const LAST_PENDING_STATUS: i32 = 2;

/// One execution request.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeCase {
    pub language_id: i32,
    pub source_code: String,
    pub stdin: String,
    pub expected_output: Option<String>,
}

/// Snapshot of one execution, pending or terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeRun {
    pub status_id: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub time_seconds: Option<f64>,
    pub memory_kb: Option<i64>,
}

impl JudgeRun {
    pub fn is_terminal(&self) -> bool {
        self.status_id > LAST_PENDING_STATUS
    }

    pub fn verdict(&self) -> CaseVerdict {
        verdict_for_status(self.status_id)
    }
}

/// Maps a terminal judge status id onto the domain verdict.
///
/// 3 accepted, 4 wrong answer, 5 time limit, 6 compilation error,
/// 7..=12 runtime error family (signals, NZEC, other). Anything else is
/// an internal judge error.
pub fn verdict_for_status(status_id: i32) -> CaseVerdict {
    match status_id {
        3 => CaseVerdict::Accepted,
        4 => CaseVerdict::WrongAnswer,
        5 => CaseVerdict::TimeLimitExceeded,
        6 => CaseVerdict::CompilationError,
        7..=12 => CaseVerdict::RuntimeError,
        _ => CaseVerdict::InternalError,
    }
}

#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Queues every case and returns one token per case, in order.
    async fn submit_batch(&self, cases: &[JudgeCase]) -> Result<Vec<String>, AppError>;

    /// Reads the current state of a queued execution.
    async fn poll_one(&self, token: &str) -> Result<JudgeRun, AppError>;

    /// Runs one program and blocks until it is terminal.
    async fn submit_synchronous(
        &self,
        language_id: i32,
        source_code: &str,
        stdin: &str,
    ) -> Result<JudgeRun, AppError>;
}

/// Polls `token` until the run is terminal, sleeping `policy.interval`
/// between attempts. Gives up with `Timeout` after `policy.attempts` polls.
pub async fn wait_for_result(
    judge: &dyn JudgeClient,
    token: &str,
    policy: PollPolicy,
) -> Result<JudgeRun, AppError> {
    for attempt in 1..=policy.attempts {
        let run = judge.poll_one(token).await?;
        if run.is_terminal() {
            tracing::debug!(token, attempt, status_id = run.status_id, "Judge run finished");
            return Ok(run);
        }
        tracing::debug!(token, attempt, status_id = run.status_id, "Judge run still pending");
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(AppError::Timeout(format!(
        "judge run {} not finished after {} polls",
        token, policy.attempts
    )))
}
