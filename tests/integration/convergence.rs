//! Convergence integration tests.
//!
//! These tests verify the ways a session stops: budgets force convergence
//! with caveats, judge rejections are bounded, and load-bearing work can
//! finish a session early.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use delve::core::{Priority, Task, TaskGraph, TaskStatus};
use delve::gates::{CompletionJudge, CompletionJudgeConfig};
use delve::orchestration::{
    ComplexityTier, Confidence, ConvergenceMode, ExecutorConfig, ForcedReason, HandoffCoordinator,
    OodaExecutor, SessionBudget, ToolDispatcher,
};

use crate::fixtures::{chain_plan, executor, fast_dispatch, query, MockBackend, ScriptedCapability};

/// Test: Iteration budget
/// Given a five-step chain and a two-iteration budget
/// When the session runs
/// Then it is forced to converge with three tasks incomplete
#[tokio::test]
async fn test_iteration_budget_forces_convergence() {
    let (graph, ids) = chain_plan(5);
    let config = ExecutorConfig {
        budget: SessionBudget {
            max_iterations: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let exec = executor(
        Arc::new(ScriptedCapability::new(graph)),
        Arc::new(MockBackend::new(2)),
        config,
    );

    let report = exec.research(query(ComplexityTier::Simple)).await;

    let convergence = report.outcome.convergence().cloned().unwrap();
    assert_eq!(
        convergence.mode,
        ConvergenceMode::Forced {
            reason: ForcedReason::IterationBudget
        }
    );
    assert!(convergence
        .caveats
        .contains(&"Research stopped early: iteration budget exhausted".to_string()));

    let graph = report.state.graph();
    assert_eq!(graph.count_by_status(TaskStatus::Completed), 2);
    assert_eq!(graph.get_task(&ids[1]).unwrap().status, TaskStatus::Completed);

    let artifact = HandoffCoordinator::default()
        .package(&report.state, &convergence)
        .unwrap();
    assert_eq!(artifact.incomplete_tasks, ids[2..].to_vec());
    assert!(artifact
        .caveats
        .iter()
        .any(|c| c.starts_with("Completion judge not satisfied")));
}

/// Test: Judge rejections are bounded
/// Given a judge that keeps naming the same missing dimension
/// When the session runs with a limit of two rejections
/// Then the dimension is researched once and the session is forced to converge
#[tokio::test]
async fn test_judge_rejections_bounded() {
    let rejection = "<judge_result>false</judge_result>\
                     <missing_dimension name=\"cost\">Battery cost per kWh</missing_dimension>";
    let (plan, _) = chain_plan(1);
    let capability = Arc::new(
        ScriptedCapability::new(plan)
            .with_judge_response(rejection)
            .with_judge_response(rejection)
            .with_judge_response(rejection),
    );
    let judge = CompletionJudge::new(CompletionJudgeConfig {
        semantic_review: true,
        ..Default::default()
    })
    .with_capability(capability.clone());
    let config = ExecutorConfig {
        max_judge_rejections: 2,
        ..Default::default()
    };
    let exec = OodaExecutor::new(
        capability.clone(),
        ToolDispatcher::new(Arc::new(MockBackend::new(2)), fast_dispatch()),
        config,
    )
    .with_judge(judge);

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert_eq!(capability.judge_calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.state.judge_rejections(), 3);
    assert_eq!(report.state.graph().task_count(), 2);

    let convergence = report.outcome.convergence().unwrap();
    assert_eq!(
        convergence.mode,
        ConvergenceMode::Forced {
            reason: ForcedReason::JudgeRejectLimit
        }
    );
    assert!(convergence
        .caveats
        .contains(&"Completion judge not satisfied: cost: Battery cost per kWh".to_string()));
}

/// Test: Early acceptance
/// Given a P0 task with a P2 follow-up
/// When the P0 task completes
/// Then the judge accepts before the follow-up runs
#[tokio::test]
async fn test_load_bearing_completion_converges_early() {
    let mut graph = TaskGraph::new();
    let core = graph
        .insert(Task::new("lithium mining output", Priority::P0).with_dimension("supply"), &[])
        .unwrap();
    let extra = graph
        .insert(
            Task::new("recycling pilot programs", Priority::P2).with_dimension("recycling"),
            &[core],
        )
        .unwrap();
    let backend = Arc::new(MockBackend::new(2));
    let exec = executor(
        Arc::new(ScriptedCapability::new(graph)),
        backend.clone(),
        ExecutorConfig::default(),
    );

    let report = exec.research(query(ComplexityTier::Simple)).await;

    let convergence = report.outcome.convergence().cloned().unwrap();
    assert_eq!(convergence.mode, ConvergenceMode::Natural);
    assert_eq!(report.state.iteration(), 1);
    assert_eq!(backend.searches.load(Ordering::SeqCst), 1);

    let artifact = HandoffCoordinator::default()
        .package(&report.state, &convergence)
        .unwrap();
    assert_eq!(artifact.incomplete_tasks, vec![extra]);
    assert_eq!(artifact.task(&core).unwrap().confidence, Confidence::High);
    assert_eq!(artifact.task(&extra).unwrap().confidence, Confidence::Low);
}

/// Test: Early acceptance can be disabled
/// Given the same plan with early checks off
/// When the session runs
/// Then every task is researched before the judge is asked
#[tokio::test]
async fn test_early_check_disabled_runs_everything() {
    let mut graph = TaskGraph::new();
    let core = graph
        .insert(Task::new("lithium mining output", Priority::P0).with_dimension("supply"), &[])
        .unwrap();
    graph
        .insert(
            Task::new("recycling pilot programs", Priority::P2).with_dimension("recycling"),
            &[core],
        )
        .unwrap();
    let config = ExecutorConfig {
        early_completion_check: false,
        ..Default::default()
    };
    let exec = executor(
        Arc::new(ScriptedCapability::new(graph)),
        Arc::new(MockBackend::new(2)),
        config,
    );

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert_eq!(report.state.iteration(), 2);
    assert_eq!(report.state.graph().count_by_status(TaskStatus::Completed), 2);
}
