// src/store/mod.rs

// Catalogue reads live on `Store`. Every write goes through a `StoreTx`,
// applied on `commit` and discarded when dropped. `lock_*` methods hold the
// row for the rest of the transaction, creating it first when missing.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{Exam, ExamAttempt, ExamResult},
        problem::{CodeTemplate, Problem, TestCase},
        stats::{GroupProblemStats, StudentOverallStats, StudentProblemStats},
        submission::{FinalKey, NewSubmission, Submission},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn problem(&self, problem_id: i64) -> Result<Option<Problem>, AppError>;

    /// Hidden test cases in a stable order.
    async fn test_cases(&self, problem_id: i64) -> Result<Vec<TestCase>, AppError>;

    async fn template(
        &self,
        language_id: i32,
        problem_id: i64,
    ) -> Result<Option<CodeTemplate>, AppError>;

    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError>;

    async fn exam_problem_ids(&self, exam_id: i64) -> Result<Vec<i64>, AppError>;

    /// Groups the student belongs to that are linked to the exam.
    async fn linked_groups(&self, student_id: i64, exam_id: i64) -> Result<Vec<i64>, AppError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<ExamAttempt>, AppError>;

    /// Locks the student's attempt for the exam, creating a `NOT_STARTED`
    /// one first if none exists. Concurrent callers end up on the same row.
    async fn lock_or_insert_attempt(
        &mut self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<ExamAttempt, AppError>;

    async fn update_attempt(&mut self, attempt: &ExamAttempt) -> Result<(), AppError>;

    /// Highest submission score per problem within the attempt.
    async fn best_scores(&mut self, attempt_id: i64) -> Result<HashMap<i64, i32>, AppError>;

    async fn insert_exam_result(&mut self, result: &ExamResult) -> Result<(), AppError>;

    async fn insert_submission(&mut self, submission: NewSubmission)
    -> Result<Submission, AppError>;

    /// Locks the final-submission slot of `key` and returns its current holder.
    async fn lock_final_submission(&mut self, key: FinalKey)
    -> Result<Option<Submission>, AppError>;

    async fn set_final(&mut self, submission_id: i64, is_final: bool) -> Result<(), AppError>;

    async fn lock_student_problem_stats(
        &mut self,
        student_id: i64,
        problem_id: i64,
        group_id: i64,
    ) -> Result<StudentProblemStats, AppError>;

    async fn save_student_problem_stats(
        &mut self,
        stats: &StudentProblemStats,
    ) -> Result<(), AppError>;

    async fn lock_group_problem_stats(
        &mut self,
        group_id: i64,
        problem_id: i64,
    ) -> Result<GroupProblemStats, AppError>;

    async fn save_group_problem_stats(&mut self, stats: &GroupProblemStats)
    -> Result<(), AppError>;

    async fn lock_overall_stats(
        &mut self,
        student_id: i64,
        group_id: i64,
    ) -> Result<StudentOverallStats, AppError>;

    async fn save_overall_stats(&mut self, stats: &StudentOverallStats) -> Result<(), AppError>;

    async fn commit(&mut self) -> Result<(), AppError>;
}
