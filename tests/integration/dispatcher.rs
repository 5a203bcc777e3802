//! Parallel dispatch integration tests.
//!
//! These tests verify that the ToolDispatcher isolates failures, retries
//! transient errors, bounds concurrency, and keeps discovery separate from
//! evidence.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use delve::core::{TaskId, TaskStatus};
use delve::evidence::Locator;
use delve::orchestration::{
    ComplexityTier, DispatcherConfig, ExecutorConfig, Operation, OperationError,
    OperationErrorKind, OperationOutput, RetryPolicy, ToolDispatcher,
};

use crate::fixtures::{
    chain_plan, executor, fast_dispatch, query, MockBackend, ScriptedCapability, Selection,
};

fn gathers(task: TaskId, count: usize) -> Vec<Operation> {
    (1..=count)
        .map(|n| Operation::gather(task, Locator(format!("https://web.example/doc/{n}"))))
        .collect()
}

/// Test: One unreachable locator does not sink the batch
/// Given five fetches where one locator is permanently unreachable
/// When the batch is dispatched
/// Then four succeed, one fails, and results keep submission order
#[tokio::test]
async fn test_unreachable_locator_isolated() {
    let backend = MockBackend::new(0).failing(
        "https://web.example/doc/3",
        vec![OperationError::unreachable("connection refused")],
    );
    let dispatcher = ToolDispatcher::new(Arc::new(backend), fast_dispatch());
    let task = TaskId::new();
    let operations = gathers(task, 5);
    let ids: Vec<_> = operations.iter().map(|op| op.id).collect();

    let results = dispatcher.dispatch_batch(operations).await;

    assert_eq!(results.len(), 5);
    assert_eq!(results.iter().map(|r| r.operation.id).collect::<Vec<_>>(), ids);
    assert_eq!(results.iter().filter(|r| r.outcome.is_ok()).count(), 4);

    let failed = &results[2];
    let err = failed.outcome.as_ref().unwrap_err();
    assert_eq!(err.kind, OperationErrorKind::Unreachable);
    assert_eq!(failed.attempts, 1);
}

/// Test: Transient failures are retried with backoff
/// Given a locator rate limited twice
/// When fetched under a three-attempt budget
/// Then the third attempt succeeds
#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_ok() {
    let backend = MockBackend::new(0).failing(
        "https://web.example/doc/1",
        vec![
            OperationError::rate_limited("429"),
            OperationError::rate_limited("429"),
        ],
    );
    let backend = Arc::new(backend);
    let dispatcher = ToolDispatcher::new(backend.clone(), fast_dispatch());

    let results = dispatcher.dispatch_batch(gathers(TaskId::new(), 1)).await;

    assert_eq!(results[0].attempts, 3);
    assert!(matches!(
        results[0].outcome,
        Ok(OperationOutput::Gathered(_))
    ));
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 3);
}

/// Test: Concurrency is bounded
/// Given eight slow fetches and a limit of three
/// When the batch is dispatched
/// Then no more than three fetches are in flight at once
#[tokio::test(start_paused = true)]
async fn test_parallelism_bounded() {
    let backend = Arc::new(MockBackend::new(0).with_fetch_delay(Duration::from_millis(50)));
    let config = DispatcherConfig {
        max_parallel: 3,
        ..fast_dispatch()
    };
    let dispatcher = ToolDispatcher::new(backend.clone(), config);

    let results = dispatcher.dispatch_batch(gathers(TaskId::new(), 8)).await;

    assert!(results.iter().all(|r| r.outcome.is_ok()));
    assert_eq!(backend.peak_in_flight.load(Ordering::SeqCst), 3);
}

/// Test: The batch deadline bounds retries
/// Given fetches that never answer within the per-attempt timeout
/// When the batch deadline passes mid-retry
/// Then every operation settles as a timeout
#[tokio::test(start_paused = true)]
async fn test_batch_deadline_bounds_retries() {
    let backend = Arc::new(MockBackend::new(0).with_fetch_delay(Duration::from_secs(10)));
    let config = DispatcherConfig {
        max_parallel: 4,
        operation_timeout: Duration::from_secs(1),
        batch_timeout: Duration::from_millis(2_500),
        retry: RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        },
    };
    let dispatcher = ToolDispatcher::new(backend, config);

    let results = dispatcher.dispatch_batch(gathers(TaskId::new(), 2)).await;

    assert_eq!(results.len(), 2);
    for result in &results {
        let err = result.outcome.as_ref().unwrap_err();
        assert_eq!(err.kind, OperationErrorKind::Timeout);
        assert_eq!(result.attempts, 3);
    }
}

/// Test: Discovery never becomes evidence on its own
/// Given a capability that never selects a discovered locator
/// When the session runs
/// Then searches happen but nothing is fetched and the store stays empty
#[tokio::test]
async fn test_discovery_without_fetch_yields_no_evidence() {
    let (graph, ids) = chain_plan(1);
    let capability = Arc::new(ScriptedCapability::new(graph).with_selection(Selection::Nothing));
    let backend = Arc::new(MockBackend::new(3));
    let exec = executor(capability, backend.clone(), ExecutorConfig::default());

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert!(report.state.evidence().is_empty());
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(backend.searches.load(Ordering::SeqCst), 3);

    let task = report.state.graph().get_task(&ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert_eq!(task.last_error.as_deref(), Some("no evidence gathered"));
    assert!(report.outcome.convergence().unwrap().is_forced());
}
