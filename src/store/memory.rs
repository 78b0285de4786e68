// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptStatus, Exam, ExamAttempt, ExamResult},
        problem::{CodeTemplate, Problem, TestCase},
        stats::{GroupProblemStats, StudentOverallStats, StudentProblemStats},
        submission::{FinalKey, NewSubmission, Submission},
    },
    store::{Store, StoreTx},
};

/// Authored data the pipeline only reads.
#[derive(Debug, Default)]
struct Catalogue {
    next_case_id: i64,
    problems: HashMap<i64, Problem>,
    test_cases: BTreeMap<i64, Vec<TestCase>>,
    templates: HashMap<(i32, i64), CodeTemplate>,
    exams: HashMap<i64, Exam>,
    exam_problems: HashMap<i64, Vec<i64>>,
    exam_groups: HashMap<i64, HashSet<i64>>,
    group_members: HashMap<i64, HashSet<i64>>,
}

/// Rows written by the pipeline.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    attempts: BTreeMap<i64, ExamAttempt>,
    results: Vec<ExamResult>,
    submissions: BTreeMap<i64, Submission>,
    student_problem_stats: HashMap<(i64, i64, i64), StudentProblemStats>,
    group_problem_stats: HashMap<(i64, i64), GroupProblemStats>,
    overall_stats: HashMap<(i64, i64), StudentOverallStats>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store. Transactions are serialized through one async mutex
/// and work on a copy of the state that replaces the original on commit.
/// Catalogue reads use a separate lock and never wait on a transaction.
#[derive(Clone, Default)]
pub struct MemoryStore {
    catalogue: Arc<RwLock<Catalogue>>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Catalogue seeding

    pub async fn insert_problem(&self, problem: Problem) {
        self.catalogue.write().await.problems.insert(problem.id, problem);
    }

    pub async fn insert_test_case(&self, problem_id: i64, input: &str, expected_output: &str) {
        let mut catalogue = self.catalogue.write().await;
        catalogue.next_case_id += 1;
        let id = catalogue.next_case_id;
        catalogue.test_cases.entry(problem_id).or_default().push(TestCase {
            id,
            problem_id,
            input: input.to_string(),
            expected_output: expected_output.to_string(),
        });
    }

    pub async fn insert_template(&self, language_id: i32, problem_id: i64, template: CodeTemplate) {
        self.catalogue
            .write()
            .await
            .templates
            .insert((language_id, problem_id), template);
    }

    pub async fn insert_exam(&self, exam: Exam, problem_ids: Vec<i64>) {
        let mut catalogue = self.catalogue.write().await;
        catalogue.exam_problems.insert(exam.id, problem_ids);
        catalogue.exams.insert(exam.id, exam);
    }

    pub async fn link_group(&self, exam_id: i64, group_id: i64) {
        self.catalogue
            .write()
            .await
            .exam_groups
            .entry(exam_id)
            .or_default()
            .insert(group_id);
    }

    pub async fn add_member(&self, group_id: i64, student_id: i64) {
        self.catalogue
            .write()
            .await
            .group_members
            .entry(group_id)
            .or_default()
            .insert(student_id);
    }

    /// Inserts an attempt as-is, bypassing the state machine.
    pub async fn put_attempt(&self, attempt: ExamAttempt) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(attempt.id);
        state.attempts.insert(attempt.id, attempt);
    }

    // Inspection

    pub async fn attempt(&self, attempt_id: i64) -> Option<ExamAttempt> {
        self.state.lock().await.attempts.get(&attempt_id).cloned()
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.state.lock().await.submissions.values().cloned().collect()
    }

    pub async fn exam_results(&self) -> Vec<ExamResult> {
        self.state.lock().await.results.clone()
    }

    pub async fn student_problem_stats(
        &self,
        student_id: i64,
        problem_id: i64,
        group_id: i64,
    ) -> Option<StudentProblemStats> {
        self.state
            .lock()
            .await
            .student_problem_stats
            .get(&(student_id, problem_id, group_id))
            .cloned()
    }

    pub async fn group_problem_stats(
        &self,
        group_id: i64,
        problem_id: i64,
    ) -> Option<GroupProblemStats> {
        self.state
            .lock()
            .await
            .group_problem_stats
            .get(&(group_id, problem_id))
            .cloned()
    }

    pub async fn overall_stats(&self, student_id: i64, group_id: i64) -> Option<StudentOverallStats> {
        self.state
            .lock()
            .await
            .overall_stats
            .get(&(student_id, group_id))
            .cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn problem(&self, problem_id: i64) -> Result<Option<Problem>, AppError> {
        Ok(self.catalogue.read().await.problems.get(&problem_id).cloned())
    }

    async fn test_cases(&self, problem_id: i64) -> Result<Vec<TestCase>, AppError> {
        Ok(self
            .catalogue
            .read()
            .await
            .test_cases
            .get(&problem_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn template(
        &self,
        language_id: i32,
        problem_id: i64,
    ) -> Result<Option<CodeTemplate>, AppError> {
        Ok(self
            .catalogue
            .read()
            .await
            .templates
            .get(&(language_id, problem_id))
            .cloned())
    }

    async fn exam(&self, exam_id: i64) -> Result<Option<Exam>, AppError> {
        Ok(self.catalogue.read().await.exams.get(&exam_id).cloned())
    }

    async fn exam_problem_ids(&self, exam_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self
            .catalogue
            .read()
            .await
            .exam_problems
            .get(&exam_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn linked_groups(&self, student_id: i64, exam_id: i64) -> Result<Vec<i64>, AppError> {
        let catalogue = self.catalogue.read().await;
        let mut groups: Vec<i64> = catalogue
            .exam_groups
            .get(&exam_id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|g| {
                catalogue
                    .group_members
                    .get(g)
                    .is_some_and(|members| members.contains(&student_id))
            })
            .collect();
        groups.sort_unstable();
        Ok(groups)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
        }))
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

impl MemoryTx {
    fn closed() -> AppError {
        AppError::InternalServerError("transaction already committed".to_string())
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(Self::closed())
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_attempt(&mut self, attempt_id: i64) -> Result<Option<ExamAttempt>, AppError> {
        self.ensure_open()?;
        Ok(self.working.attempts.get(&attempt_id).cloned())
    }

    async fn lock_or_insert_attempt(
        &mut self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<ExamAttempt, AppError> {
        self.ensure_open()?;
        if let Some(existing) = self
            .working
            .attempts
            .values()
            .find(|a| a.exam_id == exam_id && a.student_id == student_id)
        {
            return Ok(existing.clone());
        }

        let attempt = ExamAttempt {
            id: self.working.next_id(),
            exam_id,
            student_id,
            status: AttemptStatus::NotStarted,
            started_at: None,
            expires_at: None,
            submitted_at: None,
            total_score: None,
            last_heartbeat_at: None,
        };
        self.working.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn update_attempt(&mut self, attempt: &ExamAttempt) -> Result<(), AppError> {
        self.ensure_open()?;
        match self.working.attempts.get_mut(&attempt.id) {
            Some(slot) => {
                *slot = attempt.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("attempt {} not found", attempt.id))),
        }
    }

    async fn best_scores(&mut self, attempt_id: i64) -> Result<HashMap<i64, i32>, AppError> {
        self.ensure_open()?;
        let mut best: HashMap<i64, i32> = HashMap::new();
        for s in self
            .working
            .submissions
            .values()
            .filter(|s| s.attempt_id == Some(attempt_id))
        {
            let entry = best.entry(s.problem_id).or_insert(s.score);
            *entry = (*entry).max(s.score);
        }
        Ok(best)
    }

    async fn insert_exam_result(&mut self, result: &ExamResult) -> Result<(), AppError> {
        self.ensure_open()?;
        if self
            .working
            .results
            .iter()
            .any(|r| r.attempt_id == result.attempt_id)
        {
            return Err(AppError::InvalidState(format!(
                "attempt {} already has a result",
                result.attempt_id
            )));
        }
        self.working.results.push(result.clone());
        Ok(())
    }

    async fn insert_submission(
        &mut self,
        submission: NewSubmission,
    ) -> Result<Submission, AppError> {
        self.ensure_open()?;
        let id = self.working.next_id();
        let stored = submission.into_submission(id);
        self.working.submissions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn lock_final_submission(
        &mut self,
        key: FinalKey,
    ) -> Result<Option<Submission>, AppError> {
        self.ensure_open()?;
        Ok(self
            .working
            .submissions
            .values()
            .find(|s| s.is_final && FinalKey::from(*s) == key)
            .cloned())
    }

    async fn set_final(&mut self, submission_id: i64, is_final: bool) -> Result<(), AppError> {
        self.ensure_open()?;
        match self.working.submissions.get_mut(&submission_id) {
            Some(s) => {
                s.is_final = is_final;
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "submission {} not found",
                submission_id
            ))),
        }
    }

    async fn lock_student_problem_stats(
        &mut self,
        student_id: i64,
        problem_id: i64,
        group_id: i64,
    ) -> Result<StudentProblemStats, AppError> {
        self.ensure_open()?;
        Ok(self
            .working
            .student_problem_stats
            .entry((student_id, problem_id, group_id))
            .or_insert_with(|| StudentProblemStats::empty(student_id, problem_id, group_id))
            .clone())
    }

    async fn save_student_problem_stats(
        &mut self,
        stats: &StudentProblemStats,
    ) -> Result<(), AppError> {
        self.ensure_open()?;
        self.working.student_problem_stats.insert(
            (stats.student_id, stats.problem_id, stats.group_id),
            stats.clone(),
        );
        Ok(())
    }

    async fn lock_group_problem_stats(
        &mut self,
        group_id: i64,
        problem_id: i64,
    ) -> Result<GroupProblemStats, AppError> {
        self.ensure_open()?;
        Ok(self
            .working
            .group_problem_stats
            .entry((group_id, problem_id))
            .or_insert_with(|| GroupProblemStats::empty(group_id, problem_id))
            .clone())
    }

    async fn save_group_problem_stats(
        &mut self,
        stats: &GroupProblemStats,
    ) -> Result<(), AppError> {
        self.ensure_open()?;
        self.working
            .group_problem_stats
            .insert((stats.group_id, stats.problem_id), stats.clone());
        Ok(())
    }

    async fn lock_overall_stats(
        &mut self,
        student_id: i64,
        group_id: i64,
    ) -> Result<StudentOverallStats, AppError> {
        self.ensure_open()?;
        Ok(self
            .working
            .overall_stats
            .entry((student_id, group_id))
            .or_insert_with(|| StudentOverallStats::empty(student_id, group_id))
            .clone())
    }

    async fn save_overall_stats(&mut self, stats: &StudentOverallStats) -> Result<(), AppError> {
        self.ensure_open()?;
        self.working
            .overall_stats
            .insert((stats.student_id, stats.group_id), stats.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        let mut guard = self.guard.take().ok_or_else(Self::closed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
