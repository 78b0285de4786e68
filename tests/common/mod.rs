// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use grader::{
    config::PollPolicy,
    error::AppError,
    judge::{JudgeCase, JudgeClient, JudgeRun},
    models::{
        attempt::Exam,
        complexity::{ComplexityClass, ComplexityProbeSpec, FillPattern, ValueRange},
        problem::Problem,
    },
    services::{AttemptService, Evaluator},
    store::{MemoryStore, Store},
};

pub const STUDENT: i64 = 7;
pub const OTHER_STUDENT: i64 = 8;
pub const EXAM: i64 = 1;
pub const LINKED_GROUP: i64 = 10;
pub const UNLINKED_GROUP: i64 = 20;
pub const PLAIN_PROBLEM: i64 = 100;
pub const SCALED_PROBLEM: i64 = 200;
/// Not part of `EXAM`.
pub const PRACTICE_PROBLEM: i64 = 300;
pub const PYTHON: i32 = 71;

pub const ACCEPTED: i32 = 3;
pub const WRONG_ANSWER: i32 = 4;
pub const TIME_LIMIT_EXCEEDED: i32 = 5;
pub const COMPILATION_ERROR: i32 = 6;

#[derive(Default)]
struct Script {
    batches: VecDeque<Vec<i32>>,
    probe_runs: VecDeque<(i32, f64)>,
    pending_polls: u32,
    never_finish: bool,
    next_token: u64,
    runs: HashMap<String, (JudgeRun, u32)>,
    submitted: Vec<JudgeCase>,
    probe_inputs: Vec<String>,
}

/// Judge double that replays queued outcomes.
///
/// Each `submit_batch` consumes one queued list of status ids (missing
/// entries default to accepted). Each `submit_synchronous` consumes one
/// queued (status id, elapsed time) pair.
#[derive(Default)]
pub struct ScriptedJudge {
    script: Mutex<Script>,
}

impl ScriptedJudge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_batch(&self, statuses: &[i32]) {
        self.script.lock().unwrap().batches.push_back(statuses.to_vec());
    }

    pub fn push_probe_times(&self, times: &[f64]) {
        self.script
            .lock()
            .unwrap()
            .probe_runs
            .extend(times.iter().map(|&t| (ACCEPTED, t)));
    }

    pub fn push_timing_runs(&self, runs: &[(i32, f64)]) {
        self.script
            .lock()
            .unwrap()
            .probe_runs
            .extend(runs.iter().copied());
    }

    /// Every run reports "processing" this many times before finishing.
    pub fn pending_for(&self, polls: u32) {
        self.script.lock().unwrap().pending_polls = polls;
    }

    pub fn never_finish(&self) {
        self.script.lock().unwrap().never_finish = true;
    }

    pub fn submitted_cases(&self) -> Vec<JudgeCase> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn probe_inputs(&self) -> Vec<String> {
        self.script.lock().unwrap().probe_inputs.clone()
    }
}

#[async_trait]
impl JudgeClient for ScriptedJudge {
    async fn submit_batch(&self, cases: &[JudgeCase]) -> Result<Vec<String>, AppError> {
        let mut script = self.script.lock().unwrap();
        let statuses = script.batches.pop_front().unwrap_or_default();
        let mut tokens = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            script.next_token += 1;
            let token = format!("tok-{}", script.next_token);
            let status_id = statuses.get(i).copied().unwrap_or(ACCEPTED);
            let run = JudgeRun {
                status_id,
                stdout: case.expected_output.clone(),
                time_seconds: Some(0.01 * (i as f64 + 1.0)),
                memory_kb: Some(1024 * (i as i64 + 1)),
                ..Default::default()
            };
            script.runs.insert(token.clone(), (run, 0));
            script.submitted.push(case.clone());
            tokens.push(token);
        }
        Ok(tokens)
    }

    async fn poll_one(&self, token: &str) -> Result<JudgeRun, AppError> {
        let mut script = self.script.lock().unwrap();
        let pending_polls = script.pending_polls;
        let never_finish = script.never_finish;
        let (run, polls) = script
            .runs
            .get_mut(token)
            .ok_or_else(|| AppError::ExternalService(format!("unknown token {}", token)))?;
        *polls += 1;
        if never_finish || *polls <= pending_polls {
            return Ok(JudgeRun {
                status_id: 2,
                ..Default::default()
            });
        }
        Ok(run.clone())
    }

    async fn submit_synchronous(
        &self,
        _language_id: i32,
        _source_code: &str,
        stdin: &str,
    ) -> Result<JudgeRun, AppError> {
        let mut script = self.script.lock().unwrap();
        script.probe_inputs.push(stdin.to_string());
        let (status_id, time) = script
            .probe_runs
            .pop_front()
            .ok_or_else(|| AppError::ExternalService("no probe run scripted".to_string()))?;
        Ok(JudgeRun {
            status_id,
            time_seconds: Some(time),
            memory_kb: Some(2048),
            ..Default::default()
        })
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        attempts: 3,
        interval: Duration::from_millis(1),
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn probe_spec(expected: ComplexityClass) -> ComplexityProbeSpec {
    ComplexityProbeSpec {
        sizes: vec![1000, 2000, 4000],
        value_range: ValueRange { min: 0, max: 1000 },
        fill: FillPattern::Random,
        expected,
    }
}

/// One 60-minute exam with a plain 5-case problem and a 2-case problem that
/// expects O(n log n). `STUDENT` belongs to one linked and one unlinked group.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();

    store
        .insert_problem(Problem {
            id: PLAIN_PROBLEM,
            title: "Sum".to_string(),
            probe_spec: None,
        })
        .await;
    for i in 1..=5 {
        store
            .insert_test_case(PLAIN_PROBLEM, &format!("{} {}", i, i), &format!("{}\n", 2 * i))
            .await;
    }

    store
        .insert_problem(Problem {
            id: SCALED_PROBLEM,
            title: "Sort".to_string(),
            probe_spec: Some(probe_spec(ComplexityClass::Nlogn)),
        })
        .await;
    store.insert_test_case(SCALED_PROBLEM, "3\n3 1 2", "1 2 3\n").await;
    store.insert_test_case(SCALED_PROBLEM, "1\n5", "5\n").await;

    store
        .insert_problem(Problem {
            id: PRACTICE_PROBLEM,
            title: "Sort again".to_string(),
            probe_spec: Some(probe_spec(ComplexityClass::Nlogn)),
        })
        .await;
    store.insert_test_case(PRACTICE_PROBLEM, "2\n2 1", "1 2\n").await;

    store
        .insert_exam(
            Exam {
                id: EXAM,
                title: "Midterm".to_string(),
                duration_minutes: 60,
            },
            vec![PLAIN_PROBLEM, SCALED_PROBLEM],
        )
        .await;
    store.link_group(EXAM, LINKED_GROUP).await;
    store.add_member(LINKED_GROUP, STUDENT).await;
    store.add_member(UNLINKED_GROUP, STUDENT).await;
    store.add_member(LINKED_GROUP, OTHER_STUDENT).await;

    store
}

pub struct Harness {
    pub store: MemoryStore,
    pub judge: Arc<ScriptedJudge>,
    pub attempts: AttemptService,
    pub evaluator: Evaluator,
}

pub async fn harness() -> Harness {
    let store = seeded_store().await;
    let judge = ScriptedJudge::new();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    Harness {
        attempts: AttemptService::new(shared.clone()),
        evaluator: Evaluator::new(shared, judge.clone(), fast_poll(), 64 * 1024),
        store,
        judge,
    }
}
