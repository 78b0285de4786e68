// src/models/stats.rs

use serde::{Deserialize, Serialize};

/// Represents the 'group_problem_stats' table.
/// Maintained only through incremental updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProblemStats {
    pub group_id: i64,
    pub problem_id: i64,
    /// Distinct students who tried the problem in this group.
    pub attempted_count: i64,
    /// Distinct students who solved it.
    pub accepted_count: i64,
    pub total_attempts: i64,
    pub avg_runtime_ms: f64,
    pub avg_memory_kb: f64,
}

impl GroupProblemStats {
    pub fn empty(group_id: i64, problem_id: i64) -> Self {
        Self {
            group_id,
            problem_id,
            attempted_count: 0,
            accepted_count: 0,
            total_attempts: 0,
            avg_runtime_ms: 0.0,
            avg_memory_kb: 0.0,
        }
    }
}

/// Represents the 'student_problem_stats' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProblemStats {
    pub student_id: i64,
    pub problem_id: i64,
    pub group_id: i64,
    pub attempts: i64,
    /// Only ever flips false -> true.
    pub solved: bool,
}

impl StudentProblemStats {
    pub fn empty(student_id: i64, problem_id: i64, group_id: i64) -> Self {
        Self {
            student_id,
            problem_id,
            group_id,
            attempts: 0,
            solved: false,
        }
    }
}

/// Represents the 'student_overall_stats' table, per (student, group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentOverallStats {
    pub student_id: i64,
    pub group_id: i64,
    pub total_attempts: i64,
    pub exams_taken: i64,
    pub total_score: i64,
    pub average_score: f64,
}

impl StudentOverallStats {
    pub fn empty(student_id: i64, group_id: i64) -> Self {
        Self {
            student_id,
            group_id,
            total_attempts: 0,
            exams_taken: 0,
            total_score: 0,
            average_score: 0.0,
        }
    }
}

/// Per-submission data point fed to the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct StatsSample {
    pub student_id: i64,
    pub problem_id: i64,
    pub accepted: bool,
    pub runtime_ms: f64,
    pub memory_kb: f64,
}
