// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptStatus, Exam, ExamAttempt, ExamResult},
        complexity::{ComplexityClass, ComplexityProbeSpec},
        problem::{CodeTemplate, Problem, TestCase},
        stats::{GroupProblemStats, StudentOverallStats, StudentProblemStats},
        submission::{FinalKey, NewSubmission, Submission, SubmissionStatus},
    },
    store::{Store, StoreTx},
};

const ATTEMPT_COLUMNS: &str = "id, exam_id, student_id, status, started_at, expires_at, \
     submitted_at, total_score, last_heartbeat_at";

const SUBMISSION_COLUMNS: &str = "id, problem_id, student_id, attempt_id, source_code, \
     language_id, status, passed_count, total_count, score, execution_time_ms, memory_kb, \
     observed_complexity, expected_complexity, is_final, created_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ProblemRow {
    id: i64,
    title: String,
    probe_spec: Option<Json<ComplexityProbeSpec>>,
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    exam_id: i64,
    student_id: i64,
    status: String,
    started_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    total_score: Option<i32>,
    last_heartbeat_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for ExamAttempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let status = AttemptStatus::parse(&row.status).ok_or_else(|| {
            AppError::InternalServerError(format!("unknown attempt status '{}'", row.status))
        })?;
        Ok(ExamAttempt {
            id: row.id,
            exam_id: row.exam_id,
            student_id: row.student_id,
            status,
            started_at: row.started_at,
            expires_at: row.expires_at,
            submitted_at: row.submitted_at,
            total_score: row.total_score,
            last_heartbeat_at: row.last_heartbeat_at,
        })
    }
}

#[derive(FromRow)]
struct SubmissionRow {
    id: i64,
    problem_id: i64,
    student_id: i64,
    attempt_id: Option<i64>,
    source_code: String,
    language_id: i32,
    status: String,
    passed_count: i32,
    total_count: i32,
    score: i32,
    execution_time_ms: i64,
    memory_kb: i64,
    observed_complexity: Option<String>,
    expected_complexity: Option<String>,
    is_final: bool,
    created_at: DateTime<Utc>,
}

fn parse_class(raw: Option<String>) -> Result<Option<ComplexityClass>, AppError> {
    raw.map(|s| {
        ComplexityClass::parse(&s).ok_or_else(|| {
            AppError::InternalServerError(format!("unknown complexity class '{}'", s))
        })
    })
    .transpose()
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = AppError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let status = SubmissionStatus::parse(&row.status).ok_or_else(|| {
            AppError::InternalServerError(format!("unknown submission status '{}'", row.status))
        })?;
        Ok(Submission {
            id: row.id,
            problem_id: row.problem_id,
            student_id: row.student_id,
            attempt_id: row.attempt_id,
            source_code: row.source_code,
            language_id: row.language_id,
            status,
            passed_count: row.passed_count,
            total_count: row.total_count,
            score: row.score,
            execution_time_ms: row.execution_time_ms,
            memory_kb: row.memory_kb,
            observed_complexity: parse_class(row.observed_complexity)?,
            expected_complexity: parse_class(row.expected_complexity)?,
            is_final: row.is_final,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct StudentProblemRow {
    student_id: i64,
    problem_id: i64,
    group_id: i64,
    attempts: i64,
    solved: bool,
}

#[derive(FromRow)]
struct GroupProblemRow {
    group_id: i64,
    problem_id: i64,
    attempted_count: i64,
    accepted_count: i64,
    total_attempts: i64,
    avg_runtime_ms: f64,
    avg_memory_kb: f64,
}

#[derive(FromRow)]
struct OverallRow {
    student_id: i64,
    group_id: i64,
    total_attempts: i64,
    exams_taken: i64,
    total_score: i64,
    average_score: f64,
}

#[async_trait]
impl Store for PgStore {
    async fn problem(&self, problem_id: i64) -> Result<Option<Problem>, AppError> {
        let row = sqlx::query_as::<_, ProblemRow>(
            "SELECT id, title, probe_spec FROM problems WHERE id = $1",
        )
        .bind(problem_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Problem {
            id: r.id,
            title: r.title,
            probe_spec: r.probe_spec.map(|Json(spec)| spec),
        }))
    }

    async fn test_cases(&self, problem_id: i64) -> Result<Vec<TestCase>, AppError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, String)>(
            r#"
            SELECT id, problem_id, input, expected_output
            FROM test_cases
            WHERE problem_id = $1 AND is_hidden
            ORDER BY id
            "#,
        )
        .bind(problem_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, problem_id, input, expected_output)| TestCase {
                id,
                problem_id,
                input,
                expected_output,
            })
            .collect())
    }

    async fn template(
        &self,
        language_id: i32,
        problem_id: i64,
    ) -> Result<Option<CodeTemplate>, AppError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT header, footer FROM code_templates WHERE language_id = $1 AND problem_id = $2",
        )
        .bind(language_id)
        .bind(problem_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(header, footer)| CodeTemplate { header, footer }))
    }

    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        let row = sqlx::query_as::<_, (i64, String, i64)>(
            "SELECT id, title, duration_minutes FROM exams WHERE id = $1",
        )
        .bind(exam_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, title, duration_minutes)| Exam {
            id,
            title,
            duration_minutes,
        }))
    }

    async fn exam_problem_ids(&self, exam_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT problem_id FROM exam_problems WHERE exam_id = $1 ORDER BY problem_id",
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn linked_groups(&self, student_id: i64, exam_id: i64) -> Result<Vec<i64>, AppError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT eg.group_id
            FROM exam_groups eg
            JOIN group_members gm ON gm.group_id = eg.group_id
            WHERE eg.exam_id = $1 AND gm.student_id = $2
            ORDER BY eg.group_id
            "#,
        )
        .bind(exam_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::InternalServerError("transaction already committed".to_string()))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<ExamAttempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM exam_attempts WHERE id = $1 FOR UPDATE",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_optional(self.conn()?)
        .await?;

        row.map(ExamAttempt::try_from).transpose()
    }

    async fn lock_or_insert_attempt(
        &mut self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<ExamAttempt, AppError> {
        // Blocks on a concurrent uncommitted insert of the same key.
        sqlx::query(
            r#"
            INSERT INTO exam_attempts (exam_id, student_id, status)
            VALUES ($1, $2, 'NOT_STARTED')
            ON CONFLICT (exam_id, student_id) DO NOTHING
            "#,
        )
        .bind(exam_id)
        .bind(student_id)
        .execute(self.conn()?)
        .await?;

        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM exam_attempts WHERE exam_id = $1 AND student_id = $2 FOR UPDATE",
            ATTEMPT_COLUMNS
        ))
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(self.conn()?)
        .await?;

        row.try_into()
    }

    async fn update_attempt(&mut self, attempt: &ExamAttempt) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE exam_attempts
            SET status = $2, started_at = $3, expires_at = $4, submitted_at = $5,
                total_score = $6, last_heartbeat_at = $7
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(attempt.started_at)
        .bind(attempt.expires_at)
        .bind(attempt.submitted_at)
        .bind(attempt.total_score)
        .bind(attempt.last_heartbeat_at)
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("attempt {} not found", attempt.id)));
        }
        Ok(())
    }

    async fn best_scores(&mut self, attempt_id: i64) -> Result<HashMap<i64, i32>, AppError> {
        let rows = sqlx::query_as::<_, (i64, i32)>(
            r#"
            SELECT problem_id, MAX(score)
            FROM submissions
            WHERE attempt_id = $1
            GROUP BY problem_id
            "#,
        )
        .bind(attempt_id)
        .fetch_all(self.conn()?)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_exam_result(&mut self, result: &ExamResult) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO exam_results
                (attempt_id, exam_id, student_id, total_score, auto_submitted, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(result.attempt_id)
        .bind(result.exam_id)
        .bind(result.student_id)
        .bind(result.total_score)
        .bind(result.auto_submitted)
        .bind(result.submitted_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<Submission, AppError> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            r#"
            INSERT INTO submissions
                (problem_id, student_id, attempt_id, source_code, language_id, status,
                 passed_count, total_count, score, execution_time_ms, memory_kb,
                 observed_complexity, expected_complexity, is_final, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, FALSE, $14)
            RETURNING {}
            "#,
            SUBMISSION_COLUMNS
        ))
        .bind(submission.problem_id)
        .bind(submission.student_id)
        .bind(submission.attempt_id)
        .bind(&submission.source_code)
        .bind(submission.language_id)
        .bind(submission.status.as_str())
        .bind(submission.passed_count)
        .bind(submission.total_count)
        .bind(submission.score)
        .bind(submission.execution_time_ms)
        .bind(submission.memory_kb)
        .bind(submission.observed_complexity.map(ComplexityClass::as_str))
        .bind(submission.expected_complexity.map(ComplexityClass::as_str))
        .bind(submission.created_at)
        .fetch_one(self.conn()?)
        .await?;

        row.try_into()
    }

    async fn lock_final_submission(
        &mut self,
        key: FinalKey,
    ) -> Result<Option<Submission>, AppError> {
        // The slot has no row of its own, so serialize on an advisory lock
        // held until the transaction ends.
        let lock_key = format!(
            "final:{}:{}:{}",
            key.student_id,
            key.problem_id,
            key.attempt_id.unwrap_or(0)
        );
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key)
            .execute(self.conn()?)
            .await?;

        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            r#"
            SELECT {}
            FROM submissions
            WHERE student_id = $1 AND problem_id = $2
              AND attempt_id IS NOT DISTINCT FROM $3
              AND is_final
            FOR UPDATE
            "#,
            SUBMISSION_COLUMNS
        ))
        .bind(key.student_id)
        .bind(key.problem_id)
        .bind(key.attempt_id)
        .fetch_optional(self.conn()?)
        .await?;

        row.map(Submission::try_from).transpose()
    }

    async fn set_final(&mut self, submission_id: i64, is_final: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE submissions SET is_final = $2 WHERE id = $1")
            .bind(submission_id)
            .bind(is_final)
            .execute(self.conn()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "submission {} not found",
                submission_id
            )));
        }
        Ok(())
    }

    async fn lock_student_problem_stats(
        &mut self,
        student_id: i64,
        problem_id: i64,
        group_id: i64,
    ) -> Result<StudentProblemStats, AppError> {
        sqlx::query(
            r#"
            INSERT INTO student_problem_stats (student_id, problem_id, group_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(problem_id)
        .bind(group_id)
        .execute(self.conn()?)
        .await?;

        let row = sqlx::query_as::<_, StudentProblemRow>(
            r#"
            SELECT student_id, problem_id, group_id, attempts, solved
            FROM student_problem_stats
            WHERE student_id = $1 AND problem_id = $2 AND group_id = $3
            FOR UPDATE
            "#,
        )
        .bind(student_id)
        .bind(problem_id)
        .bind(group_id)
        .fetch_one(self.conn()?)
        .await?;

        Ok(StudentProblemStats {
            student_id: row.student_id,
            problem_id: row.problem_id,
            group_id: row.group_id,
            attempts: row.attempts,
            solved: row.solved,
        })
    }

    async fn save_student_problem_stats(
        &mut self,
        stats: &StudentProblemStats,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE student_problem_stats
            SET attempts = $4, solved = $5
            WHERE student_id = $1 AND problem_id = $2 AND group_id = $3
            "#,
        )
        .bind(stats.student_id)
        .bind(stats.problem_id)
        .bind(stats.group_id)
        .bind(stats.attempts)
        .bind(stats.solved)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn lock_group_problem_stats(
        &mut self,
        group_id: i64,
        problem_id: i64,
    ) -> Result<GroupProblemStats, AppError> {
        sqlx::query(
            r#"
            INSERT INTO group_problem_stats (group_id, problem_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(problem_id)
        .execute(self.conn()?)
        .await?;

        let row = sqlx::query_as::<_, GroupProblemRow>(
            r#"
            SELECT group_id, problem_id, attempted_count, accepted_count, total_attempts,
                   avg_runtime_ms, avg_memory_kb
            FROM group_problem_stats
            WHERE group_id = $1 AND problem_id = $2
            FOR UPDATE
            "#,
        )
        .bind(group_id)
        .bind(problem_id)
        .fetch_one(self.conn()?)
        .await?;

        Ok(GroupProblemStats {
            group_id: row.group_id,
            problem_id: row.problem_id,
            attempted_count: row.attempted_count,
            accepted_count: row.accepted_count,
            total_attempts: row.total_attempts,
            avg_runtime_ms: row.avg_runtime_ms,
            avg_memory_kb: row.avg_memory_kb,
        })
    }

    async fn save_group_problem_stats(
        &mut self,
        stats: &GroupProblemStats,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE group_problem_stats
            SET attempted_count = $3, accepted_count = $4, total_attempts = $5,
                avg_runtime_ms = $6, avg_memory_kb = $7
            WHERE group_id = $1 AND problem_id = $2
            "#,
        )
        .bind(stats.group_id)
        .bind(stats.problem_id)
        .bind(stats.attempted_count)
        .bind(stats.accepted_count)
        .bind(stats.total_attempts)
        .bind(stats.avg_runtime_ms)
        .bind(stats.avg_memory_kb)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn lock_overall_stats(
        &mut self,
        student_id: i64,
        group_id: i64,
    ) -> Result<StudentOverallStats, AppError> {
        sqlx::query(
            r#"
            INSERT INTO student_overall_stats (student_id, group_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(group_id)
        .execute(self.conn()?)
        .await?;

        let row = sqlx::query_as::<_, OverallRow>(
            r#"
            SELECT student_id, group_id, total_attempts, exams_taken, total_score, average_score
            FROM student_overall_stats
            WHERE student_id = $1 AND group_id = $2
            FOR UPDATE
            "#,
        )
        .bind(student_id)
        .bind(group_id)
        .fetch_one(self.conn()?)
        .await?;

        Ok(StudentOverallStats {
            student_id: row.student_id,
            group_id: row.group_id,
            total_attempts: row.total_attempts,
            exams_taken: row.exams_taken,
            total_score: row.total_score,
            average_score: row.average_score,
        })
    }

    async fn save_overall_stats(&mut self, stats: &StudentOverallStats) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE student_overall_stats
            SET total_attempts = $3, exams_taken = $4, total_score = $5, average_score = $6
            WHERE student_id = $1 AND group_id = $2
            "#,
        )
        .bind(stats.student_id)
        .bind(stats.group_id)
        .bind(stats.total_attempts)
        .bind(stats.exams_taken)
        .bind(stats.total_score)
        .bind(stats.average_score)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        let tx = self.tx.take().ok_or_else(|| {
            AppError::InternalServerError("transaction already committed".to_string())
        })?;
        tx.commit().await?;
        Ok(())
    }
}
