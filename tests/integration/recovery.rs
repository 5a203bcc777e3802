//! Failure recovery integration tests.
//!
//! These tests verify that blocked tasks are retried with their last error
//! in view, that attempts are bounded, and that cancellation stops a
//! session without consulting the judge.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use delve::core::TaskStatus;
use delve::orchestration::{
    ComplexityTier, ConvergenceMode, ExecutorConfig, ForcedReason, OperationError, SessionOutcome,
    SessionPhase,
};
use delve::Error;

use crate::fixtures::{chain_plan, executor, locator_for, query, MockBackend, ScriptedCapability};

/// Test: Requeued task carries its failure
/// Given a task whose sources are all unreachable once
/// When the session retries the task
/// Then the second proposal sees the error and the task completes
#[tokio::test]
async fn test_requeued_task_sees_last_error() {
    let (graph, ids) = chain_plan(1);
    let capability = Arc::new(ScriptedCapability::new(graph));
    let backend = Arc::new(
        MockBackend::new(2)
            .failing(
                locator_for("chain step 0", 1).as_str(),
                vec![OperationError::unreachable("connection refused")],
            )
            .failing(
                locator_for("chain step 0", 2).as_str(),
                vec![OperationError::unreachable("connection refused")],
            ),
    );
    let exec = executor(capability.clone(), backend.clone(), ExecutorConfig::default());

    let report = exec.research(query(ComplexityTier::Simple)).await;

    let seen = capability.seen_errors.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, None);
    assert!(seen[1]
        .1
        .as_deref()
        .unwrap()
        .starts_with("unreachable: connection refused"));

    let task = report.state.graph().get_task(&ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 2);
    assert_eq!(
        report.outcome.convergence().unwrap().mode,
        ConvergenceMode::Natural
    );
}

/// Test: Rate limiting inside a session
/// Given a source that is rate limited twice
/// When the session gathers evidence
/// Then the dispatcher retries and the task completes in one iteration
#[tokio::test(start_paused = true)]
async fn test_rate_limited_source_retried_in_session() {
    let (graph, ids) = chain_plan(1);
    let backend = Arc::new(MockBackend::new(2).failing(
        locator_for("chain step 0", 1).as_str(),
        vec![
            OperationError::rate_limited("429"),
            OperationError::rate_limited("429"),
        ],
    ));
    let exec = executor(
        Arc::new(ScriptedCapability::new(graph)),
        backend.clone(),
        ExecutorConfig::default(),
    );

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert_eq!(report.state.iteration(), 1);
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 4);
    assert_eq!(report.state.evidence().len(), 2);
    let task = report.state.graph().get_task(&ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(!report.outcome.convergence().unwrap().is_forced());
}

/// Test: Attempts are bounded
/// Given a task whose source fails on every try and a two-attempt limit
/// When the session runs
/// Then the task fails with the attempt count in its error
#[tokio::test]
async fn test_exhausted_attempts_fail_task() {
    let (graph, ids) = chain_plan(1);
    let backend = Arc::new(MockBackend::new(1).failing(
        locator_for("chain step 0", 1).as_str(),
        vec![
            OperationError::unreachable("connection refused"),
            OperationError::unreachable("connection refused"),
        ],
    ));
    let config = ExecutorConfig {
        max_task_attempts: 2,
        max_judge_rejections: 0,
        ..Default::default()
    };
    let exec = executor(Arc::new(ScriptedCapability::new(graph)), backend.clone(), config);

    let report = exec.research(query(ComplexityTier::Simple)).await;

    let task = report.state.graph().get_task(&ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("exceeded 2 attempts"));
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);

    let convergence = report.outcome.convergence().unwrap();
    assert_eq!(
        convergence.mode,
        ConvergenceMode::Forced {
            reason: ForcedReason::JudgeRejectLimit
        }
    );
    assert!(convergence
        .caveats
        .iter()
        .any(|c| c.starts_with("Completion judge not satisfied")));
}

/// Test: Cancellation mid-session
/// Given a backend that cancels the session during discovery
/// When the session runs
/// Then nothing is fetched, the judge is never asked, and the session hard-fails
#[tokio::test]
async fn test_cancellation_stops_session() {
    let (graph, _) = chain_plan(2);
    let capability = Arc::new(ScriptedCapability::new(graph));
    let cancel = CancellationToken::new();
    let backend = Arc::new(MockBackend::new(2).cancelling(cancel.clone()));
    let exec = executor(capability.clone(), backend.clone(), ExecutorConfig::default())
        .with_cancellation(cancel);

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert_eq!(
        report.outcome,
        SessionOutcome::HardFailed(Error::Cancelled.to_string())
    );
    assert_eq!(report.state.phase(), SessionPhase::HardFailed);
    assert!(report.state.completion_verdict().is_none());
    assert_eq!(capability.judge_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.searches.load(Ordering::SeqCst), 1);
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
}
