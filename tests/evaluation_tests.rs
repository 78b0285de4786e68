// tests/evaluation_tests.rs

mod common;

use chrono::Duration;
use common::*;
use grader::{
    error::AppError,
    models::{
        attempt::AttemptStatus,
        complexity::ComplexityClass,
        problem::CodeTemplate,
        submission::{CaseVerdict, EvaluationMode, SubmissionStatus},
    },
    services::EvaluationRequest,
};

fn exam_request(attempt_id: i64, problem_id: i64) -> EvaluationRequest {
    EvaluationRequest {
        student_id: STUDENT,
        attempt_id: Some(attempt_id),
        problem_id,
        language_id: PYTHON,
        source_code: "print(sum(map(int, input().split())))".to_string(),
        mode: EvaluationMode::Exam,
    }
}

fn practice_request(problem_id: i64) -> EvaluationRequest {
    EvaluationRequest {
        student_id: STUDENT,
        attempt_id: None,
        problem_id,
        language_id: PYTHON,
        source_code: "print(*sorted(map(int, input().split())))".to_string(),
        mode: EvaluationMode::Practice,
    }
}

async fn started(h: &Harness) -> i64 {
    h.attempts.start(EXAM, STUDENT, t0()).await.unwrap().id
}

#[tokio::test]
async fn compile_error_overrides_passing_cases() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[ACCEPTED, ACCEPTED, COMPILATION_ERROR]);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::CompileError);
    assert_eq!(response.case_verdicts[2], CaseVerdict::CompilationError);
    assert_eq!(response.submission.passed_count, 4);
    assert_eq!(response.submission.total_count, 5);
    assert!(response.complexity.is_none());
}

#[tokio::test]
async fn better_resubmission_takes_over_final_and_counts_student_once() {
    let h = harness().await;
    let attempt_id = started(&h).await;

    h.judge
        .push_batch(&[ACCEPTED, ACCEPTED, ACCEPTED, WRONG_ANSWER, WRONG_ANSWER]);
    let first = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();
    assert_eq!(first.submission.status, SubmissionStatus::Partial);
    assert_eq!(first.submission.score, 60);
    assert!(first.submission.is_final);

    h.judge.push_batch(&[]);
    let second = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();
    assert_eq!(second.submission.status, SubmissionStatus::Accepted);
    assert_eq!(second.submission.score, 100);
    assert!(second.submission.is_final);

    let stored = h.store.submissions().await;
    let finals: Vec<_> = stored.iter().filter(|s| s.is_final).collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].id, second.submission.id);

    let student = h
        .store
        .student_problem_stats(STUDENT, PLAIN_PROBLEM, LINKED_GROUP)
        .await
        .unwrap();
    assert_eq!(student.attempts, 2);
    assert!(student.solved);

    let group = h
        .store
        .group_problem_stats(LINKED_GROUP, PLAIN_PROBLEM)
        .await
        .unwrap();
    assert_eq!(group.attempted_count, 1);
    assert_eq!(group.accepted_count, 1);
    assert_eq!(group.total_attempts, 2);

    let overall = h.store.overall_stats(STUDENT, LINKED_GROUP).await.unwrap();
    assert_eq!(overall.total_attempts, 2);
    assert_eq!(overall.exams_taken, 0);

    // Membership alone is not enough; the group must be linked to the exam.
    assert!(
        h.store
            .group_problem_stats(UNLINKED_GROUP, PLAIN_PROBLEM)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn weaker_resubmission_keeps_previous_final_and_solved_flag() {
    let h = harness().await;
    let attempt_id = started(&h).await;

    h.judge.push_batch(&[]);
    let best = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();

    h.judge.push_batch(&[WRONG_ANSWER, WRONG_ANSWER]);
    let worse = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();
    assert!(!worse.submission.is_final);

    let finals: Vec<i64> = h
        .store
        .submissions()
        .await
        .into_iter()
        .filter(|s| s.is_final)
        .map(|s| s.id)
        .collect();
    assert_eq!(finals, vec![best.submission.id]);

    let student = h
        .store
        .student_problem_stats(STUDENT, PLAIN_PROBLEM, LINKED_GROUP)
        .await
        .unwrap();
    assert!(student.solved);

    let group = h
        .store
        .group_problem_stats(LINKED_GROUP, PLAIN_PROBLEM)
        .await
        .unwrap();
    assert_eq!(group.accepted_count, 1);
    assert_eq!(group.total_attempts, 2);
}

#[tokio::test]
async fn exam_mode_halves_score_for_inefficient_solution() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[]);
    h.judge.push_probe_times(&[10.0, 100.0, 1000.0]);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::Accepted);
    assert_eq!(response.submission.score, 50);
    assert_eq!(
        response.submission.observed_complexity,
        Some(ComplexityClass::Exp)
    );
    assert_eq!(
        response.submission.expected_complexity,
        Some(ComplexityClass::Nlogn)
    );

    let probes = h.judge.probe_inputs();
    assert_eq!(probes.len(), 3);
    assert!(probes[0].starts_with("1000\n"));
    assert!(probes[1].starts_with("2000\n"));
    assert!(probes[2].starts_with("4000\n"));
    assert_eq!(probes[2].lines().nth(1).unwrap().split(' ').count(), 4000);
}

#[tokio::test]
async fn efficient_solution_keeps_full_score() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[]);
    h.judge.push_probe_times(&[10.0, 20.0, 40.0]);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.score, 100);
    let complexity = response.complexity.unwrap();
    assert!(complexity.passed);
    assert_eq!(complexity.observed, Some(ComplexityClass::Nlogn));
}

#[tokio::test]
async fn partial_solution_is_never_probed() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[ACCEPTED, WRONG_ANSWER]);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::Partial);
    assert_eq!(response.submission.score, 50);
    assert!(h.judge.probe_inputs().is_empty());
}

#[tokio::test]
async fn practice_mode_marks_bad_scaling_without_stats() {
    let h = harness().await;
    h.judge.push_batch(&[]);
    h.judge.push_probe_times(&[10.0, 100.0, 1000.0]);

    let response = h
        .evaluator
        .evaluate(practice_request(PRACTICE_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::BadScaling);
    assert_eq!(response.submission.score, 100);
    assert_eq!(response.submission.attempt_id, None);
    assert!(response.submission.is_final);
    assert!(h.store.overall_stats(STUDENT, LINKED_GROUP).await.is_none());
}

#[tokio::test]
async fn timed_out_scaling_run_halves_exam_score() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[]);
    h.judge.push_timing_runs(&[
        (ACCEPTED, 0.1),
        (ACCEPTED, 0.8),
        (TIME_LIMIT_EXCEEDED, 5.0),
    ]);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::Accepted);
    assert_eq!(response.submission.score, 50);
    assert_eq!(response.submission.observed_complexity, None);
    let complexity = response.complexity.unwrap();
    assert!(!complexity.passed);
    assert_eq!(complexity.timings, vec![0.1, 0.8]);
    assert_eq!(h.store.submissions().await.len(), 1);
}

#[tokio::test]
async fn timed_out_scaling_run_is_bad_scaling_in_practice() {
    let h = harness().await;
    h.judge.push_batch(&[]);
    h.judge.push_timing_runs(&[(ACCEPTED, 0.1), (TIME_LIMIT_EXCEEDED, 5.0)]);

    let response = h
        .evaluator
        .evaluate(practice_request(PRACTICE_PROBLEM), t0())
        .await
        .unwrap();

    assert_eq!(response.submission.status, SubmissionStatus::BadScaling);
    assert_eq!(response.submission.score, 100);
    // Nothing runs after the timed-out run.
    assert_eq!(h.judge.probe_inputs().len(), 2);
}

#[tokio::test]
async fn crashing_scaling_run_is_unstable() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[]);
    h.judge.push_timing_runs(&[(ACCEPTED, 0.1), (11, 0.2)]);

    let err = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnstableMeasurement(_)));
    assert!(h.store.submissions().await.is_empty());
}

#[tokio::test]
async fn unstable_timings_persist_nothing() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.push_batch(&[]);
    h.judge.push_probe_times(&[10.0, 15.0, 100.0]);

    let err = h
        .evaluator
        .evaluate(exam_request(attempt_id, SCALED_PROBLEM), t0())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnstableMeasurement(_)));
    assert!(h.store.submissions().await.is_empty());
    assert!(
        h.store
            .group_problem_stats(LINKED_GROUP, SCALED_PROBLEM)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn judge_that_never_finishes_times_out() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.never_finish();

    let err = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(h.store.submissions().await.is_empty());
}

#[tokio::test]
async fn slow_runs_finish_within_poll_budget() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    h.judge.pending_for(2);

    let response = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
        .await
        .unwrap();
    assert_eq!(response.submission.status, SubmissionStatus::Accepted);
    assert_eq!(response.submission.execution_time_ms, 150);
    assert_eq!(response.submission.memory_kb, 5 * 1024);
}

#[tokio::test]
async fn template_wraps_sanitized_source() {
    let h = harness().await;
    h.store
        .insert_template(
            PYTHON,
            PLAIN_PROBLEM,
            CodeTemplate {
                header: "import sys".to_string(),
                footer: "main()".to_string(),
            },
        )
        .await;
    let mut request = practice_request(PLAIN_PROBLEM);
    request.source_code = "x\u{00A0}= \u{201C}a\u{201D}\u{200B}\r\n".to_string();

    let response = h.evaluator.evaluate(request, t0()).await.unwrap();

    let cases = h.judge.submitted_cases();
    assert_eq!(cases.len(), 5);
    assert_eq!(cases[0].source_code, "import sys\nx = \"a\"\n\nmain()");
    assert_eq!(cases[0].stdin, "1 1");
    assert_eq!(cases[0].expected_output.as_deref(), Some("2\n"));
    // The raw text is what gets stored.
    assert!(response.submission.source_code.contains('\u{201C}'));
}

#[tokio::test]
async fn missing_problem_and_foreign_problem_are_not_found() {
    let h = harness().await;
    let attempt_id = started(&h).await;

    let err = h
        .evaluator
        .evaluate(practice_request(999), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = h
        .evaluator
        .evaluate(exam_request(attempt_id, PRACTICE_PROBLEM), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(h.judge.submitted_cases().is_empty());
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let h = harness().await;

    let mut no_attempt = exam_request(0, PLAIN_PROBLEM);
    no_attempt.attempt_id = None;
    assert!(matches!(
        h.evaluator.evaluate(no_attempt, t0()).await,
        Err(AppError::Validation(_))
    ));

    let mut huge = practice_request(PLAIN_PROBLEM);
    huge.source_code = "x".repeat(64 * 1024 + 1);
    assert!(matches!(
        h.evaluator.evaluate(huge, t0()).await,
        Err(AppError::Validation(_))
    ));

    let mut blank = practice_request(PLAIN_PROBLEM);
    blank.source_code = "  \n ".to_string();
    assert!(matches!(
        h.evaluator.evaluate(blank, t0()).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn other_students_attempt_is_forbidden() {
    let h = harness().await;
    let attempt_id = started(&h).await;

    let mut request = exam_request(attempt_id, PLAIN_PROBLEM);
    request.student_id = OTHER_STUDENT;
    assert!(matches!(
        h.evaluator.evaluate(request, t0()).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn submission_after_deadline_auto_submits_attempt() {
    let h = harness().await;
    let attempt_id = started(&h).await;

    h.judge.push_batch(&[]);
    h.evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0() + Duration::minutes(10))
        .await
        .unwrap();

    let late = t0() + Duration::minutes(61);
    let err = h
        .evaluator
        .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), late)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ExamExpired(_)));

    let attempt = h.store.attempt(attempt_id).await.unwrap();
    assert_eq!(attempt.status, AttemptStatus::AutoSubmitted);
    assert_eq!(attempt.submitted_at, Some(late));
    // 100 on one problem, nothing on the other.
    assert_eq!(attempt.total_score, Some(50));

    let results = h.store.exam_results().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].auto_submitted);
    assert_eq!(h.store.submissions().await.len(), 1);
    assert_eq!(h.judge.submitted_cases().len(), 5);
}

#[tokio::test]
async fn concurrent_submissions_keep_single_final_and_first_attempt() {
    let h = harness().await;
    let attempt_id = started(&h).await;
    for _ in 0..6 {
        h.judge.push_batch(&[]);
    }

    let mut handles = Vec::new();
    for _ in 0..6 {
        let evaluator = h.evaluator.clone();
        handles.push(tokio::spawn(async move {
            evaluator
                .evaluate(exam_request(attempt_id, PLAIN_PROBLEM), t0())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let finals = h
        .store
        .submissions()
        .await
        .into_iter()
        .filter(|s| s.is_final)
        .count();
    assert_eq!(finals, 1);

    let group = h
        .store
        .group_problem_stats(LINKED_GROUP, PLAIN_PROBLEM)
        .await
        .unwrap();
    assert_eq!(group.attempted_count, 1);
    assert_eq!(group.accepted_count, 1);
    assert_eq!(group.total_attempts, 6);
}
