// src/models/problem.rs

use serde::{Deserialize, Serialize};

use crate::models::complexity::ComplexityProbeSpec;

/// Represents the 'problems' table (read-only here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    pub title: String,
    /// Present when the problem is graded for scaling as well as correctness.
    pub probe_spec: Option<ComplexityProbeSpec>,
}

/// Hidden input/expected-output pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub problem_id: i64,
    pub input: String,
    pub expected_output: String,
}

/// Per-language driver code wrapped around the student's source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTemplate {
    pub header: String,
    pub footer: String,
}
