//! Validation gate integration tests.
//!
//! These tests verify the plan validator and completion judge on their own
//! and as the executor consults them.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use delve::core::{Priority, Task, TaskGraph, TaskStatus};
use delve::evidence::EvidenceStore;
use delve::gates::{CompletionJudge, CompletionJudgeConfig, PlanValidator, PlanValidatorConfig};
use delve::orchestration::{
    ComplexityTier, ConvergenceMode, ExecutorConfig, OodaExecutor, ResearchQuery, SessionOutcome,
    ToolDispatcher,
};

use crate::fixtures::{chain_plan, diamond_plan, fast_dispatch, query, MockBackend, ScriptedCapability};

fn semantic_plan_executor(capability: Arc<ScriptedCapability>) -> OodaExecutor {
    let validator = PlanValidator::new(PlanValidatorConfig {
        semantic_review: true,
        ..Default::default()
    })
    .with_capability(capability.clone());
    OodaExecutor::new(
        capability,
        ToolDispatcher::new(Arc::new(MockBackend::new(2)), fast_dispatch()),
        ExecutorConfig::default(),
    )
    .with_plan_validator(validator)
}

/// Test: Thin plan for a complex query
/// Given a two-task plan covering one dimension
/// When validated against a complex query
/// Then it is rejected with missing scope and dimensions
#[test]
fn test_complex_two_task_plan_rejected() {
    let mut graph = TaskGraph::new();
    graph
        .insert(Task::new("lithium mining output", Priority::P0).with_dimension("supply"), &[])
        .unwrap();
    graph
        .insert(Task::new("cobalt refining", Priority::P1).with_dimension("supply"), &[])
        .unwrap();

    let verdict = PlanValidator::new(PlanValidatorConfig::default())
        .check_structure(&query(ComplexityTier::Complex), &graph);

    assert!(!verdict.accepted);
    let dimensions: Vec<&str> = verdict.issues.iter().map(|i| i.dimension.as_str()).collect();
    assert!(dimensions.contains(&"scope"));
    assert!(dimensions.contains(&"dimensions"));
}

/// Test: Constraint coverage
/// Given a query constraint no objective mentions
/// When validated
/// Then the constraint itself is reported, and covering it clears the issue
#[test]
fn test_uncovered_constraint_rejected() {
    let research = ResearchQuery::new("battery outlook", ComplexityTier::Simple)
        .with_constraint("solid-state battery timelines");
    let validator = PlanValidator::new(PlanValidatorConfig::default());

    let mut graph = TaskGraph::new();
    graph
        .insert(Task::new("lithium mining output", Priority::P0).with_dimension("supply"), &[])
        .unwrap();
    let verdict = validator.check_structure(&research, &graph);
    assert!(!verdict.accepted);
    assert_eq!(verdict.issues[0].dimension, "solid-state battery timelines");

    graph
        .insert(
            Task::new("solid-state battery commercialization timelines", Priority::P1)
                .with_dimension("technology"),
            &[],
        )
        .unwrap();
    assert!(validator.check_structure(&research, &graph).accepted);
}

/// Test: Semantic review drives a revision
/// Given a capability that flags a missing dimension once
/// When the session plans
/// Then the plan is revised once and the session converges
#[tokio::test]
async fn test_semantic_plan_rejection_drives_revision() {
    let (initial, _) = chain_plan(1);
    let mut revised = initial.clone();
    revised
        .insert(
            Task::new("EU battery regulation", Priority::P1).with_dimension("regulation"),
            &[],
        )
        .unwrap();

    let capability = Arc::new(
        ScriptedCapability::new(initial)
            .with_revision(revised)
            .with_judge_response(
                "<validation_result>false</validation_result>\n\
                 <missing_dimension name=\"regulation\">EU battery regulation</missing_dimension>",
            ),
    );
    let report = semantic_plan_executor(capability.clone())
        .research(query(ComplexityTier::Simple))
        .await;

    assert_eq!(report.state.plan_revisions(), 1);
    assert_eq!(capability.revise_calls.load(Ordering::SeqCst), 1);
    assert_eq!(capability.judge_calls.load(Ordering::SeqCst), 2);
    assert!(report.state.plan_verdict().unwrap().accepted);
    assert_eq!(report.state.graph().task_count(), 2);
    assert_eq!(
        report.outcome.convergence().unwrap().mode,
        ConvergenceMode::Natural
    );
}

/// Test: Untagged gate answer
/// Given a capability that answers the plan gate in free text
/// When the session plans
/// Then the session hard-fails with a malformed response
#[tokio::test]
async fn test_malformed_gate_response_hard_fails() {
    let (plan, _) = chain_plan(1);
    let capability = Arc::new(ScriptedCapability::new(plan).with_judge_response("Looks fine to me."));
    let report = semantic_plan_executor(capability)
        .research(query(ComplexityTier::Simple))
        .await;

    match &report.outcome {
        SessionOutcome::HardFailed(reason) => {
            assert!(reason.starts_with("Malformed capability response"))
        }
        other => panic!("expected hard failure, got {other:?}"),
    }
    assert!(report.state.evidence().is_empty());
}

/// Test: Empty store
/// Given a plan and no evidence
/// When the completion judge runs
/// Then it rejects regardless of task status
#[test]
fn test_judge_rejects_empty_store() {
    let plan = diamond_plan();
    let verdict = CompletionJudge::new(CompletionJudgeConfig::default())
        .check_evidence(&plan.graph, &EvidenceStore::new());

    assert!(!verdict.accepted);
    assert_eq!(verdict.issues.len(), 1);
    assert_eq!(verdict.issues[0].dimension, "evidence");
}

/// Test: Semantic completion rejection becomes work
/// Given a judge that names a missing dimension once
/// When the session converges
/// Then a P1 task for that dimension is researched before acceptance
#[tokio::test]
async fn test_judge_missing_dimension_becomes_task() {
    let (plan, _) = chain_plan(1);
    let capability = Arc::new(ScriptedCapability::new(plan).with_judge_response(
        "<judge_result>false</judge_result>\
         <missing_dimension name=\"cost\">Battery cost per kWh</missing_dimension>",
    ));
    let judge = CompletionJudge::new(CompletionJudgeConfig {
        semantic_review: true,
        ..Default::default()
    })
    .with_capability(capability.clone());
    let exec = OodaExecutor::new(
        capability.clone(),
        ToolDispatcher::new(Arc::new(MockBackend::new(2)), fast_dispatch()),
        ExecutorConfig::default(),
    )
    .with_judge(judge);

    let report = exec.research(query(ComplexityTier::Simple)).await;

    assert_eq!(
        report.outcome.convergence().unwrap().mode,
        ConvergenceMode::Natural
    );
    assert_eq!(report.state.judge_rejections(), 1);
    assert_eq!(capability.judge_calls.load(Ordering::SeqCst), 2);

    let added = report
        .state
        .graph()
        .tasks()
        .into_iter()
        .find(|t| t.dimension.as_deref() == Some("cost"))
        .cloned()
        .unwrap();
    assert_eq!(added.objective, "Battery cost per kWh");
    assert_eq!(added.priority, Priority::P1);
    assert_eq!(added.status, TaskStatus::Completed);
}
