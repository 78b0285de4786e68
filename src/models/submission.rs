// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::complexity::{ComplexityClass, ComplexityVerdict};

/// Outcome of a single hidden test case as reported by the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseVerdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompilationError,
    RuntimeError,
    /// Judge-specific fallback for anything else terminal.
    InternalError,
}

/// Overall status recorded on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Accepted,
    Partial,
    WrongAnswer,
    CompileError,
    TimeLimit,
    RuntimeError,
    /// Practice-mode only: functionally correct but scales worse than expected.
    BadScaling,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Partial => "PARTIAL",
            Self::WrongAnswer => "WRONG_ANSWER",
            Self::CompileError => "COMPILE_ERROR",
            Self::TimeLimit => "TIME_LIMIT",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::BadScaling => "BAD_SCALING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCEPTED" => Some(Self::Accepted),
            "PARTIAL" => Some(Self::Partial),
            "WRONG_ANSWER" => Some(Self::WrongAnswer),
            "COMPILE_ERROR" => Some(Self::CompileError),
            "TIME_LIMIT" => Some(Self::TimeLimit),
            "RUNTIME_ERROR" => Some(Self::RuntimeError),
            "BAD_SCALING" => Some(Self::BadScaling),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the submission came from. The two modes react differently to an
/// inefficient complexity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    Exam,
    Practice,
}

/// Represents the 'submissions' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub problem_id: i64,
    pub student_id: i64,
    pub attempt_id: Option<i64>,

    /// Raw (unsanitized) source as submitted.
    #[serde(skip_serializing)]
    pub source_code: String,

    pub language_id: i32,
    pub status: SubmissionStatus,
    pub passed_count: i32,
    pub total_count: i32,

    /// Final score in [0, 100], after any complexity penalty.
    pub score: i32,

    /// Sum of per-case execution time.
    pub execution_time_ms: i64,

    /// Peak per-case memory.
    pub memory_kb: i64,

    pub observed_complexity: Option<ComplexityClass>,
    pub expected_complexity: Option<ComplexityClass>,
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
}

/// Graded submission about to be persisted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub problem_id: i64,
    pub student_id: i64,
    pub attempt_id: Option<i64>,
    pub source_code: String,
    pub language_id: i32,
    pub status: SubmissionStatus,
    pub passed_count: i32,
    pub total_count: i32,
    pub score: i32,
    pub execution_time_ms: i64,
    pub memory_kb: i64,
    pub observed_complexity: Option<ComplexityClass>,
    pub expected_complexity: Option<ComplexityClass>,
    pub created_at: DateTime<Utc>,
}

impl NewSubmission {
    pub fn into_submission(self, id: i64) -> Submission {
        Submission {
            id,
            problem_id: self.problem_id,
            student_id: self.student_id,
            attempt_id: self.attempt_id,
            source_code: self.source_code,
            language_id: self.language_id,
            status: self.status,
            passed_count: self.passed_count,
            total_count: self.total_count,
            score: self.score,
            execution_time_ms: self.execution_time_ms,
            memory_kb: self.memory_kb,
            observed_complexity: self.observed_complexity,
            expected_complexity: self.expected_complexity,
            is_final: false,
            created_at: self.created_at,
        }
    }
}

/// Identity of the "final submission" slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinalKey {
    pub student_id: i64,
    pub problem_id: i64,
    pub attempt_id: Option<i64>,
}

impl From<&Submission> for FinalKey {
    fn from(s: &Submission) -> Self {
        Self {
            student_id: s.student_id,
            problem_id: s.problem_id,
            attempt_id: s.attempt_id,
        }
    }
}

/// DTO for submitting code for grading.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCodeRequest {
    #[validate(range(min = 1))]
    pub problem_id: i64,
    #[validate(range(min = 1))]
    pub language_id: i32,
    #[validate(length(min = 1, max = 1048576))]
    pub source_code: String,
}

/// Response for a graded submission.
#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub submission: Submission,
    pub case_verdicts: Vec<CaseVerdict>,
    pub complexity: Option<ComplexityVerdict>,
}
