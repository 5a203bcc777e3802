//! Completion gate, consulted before the session may hand off.

use super::verdict::{parse_gate_response, GateKind, ValidationVerdict, VerdictIssue};
use crate::core::dag::TaskGraph;
use crate::core::task::{Priority, Task, TaskStatus};
use crate::error::Result;
use crate::evidence::{EvidenceStore, EvidenceSummary};
use crate::orchestration::capability::{JudgeRequest, ReasoningCapability, ResearchQuery};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionJudgeConfig {
    /// Share of P1 tasks that must be completed.
    pub min_p1_completion: f64,
    pub min_evidence_per_task: usize,
    /// Distinct locators a task needs to count as sufficiently sourced.
    pub min_sources: usize,
    pub semantic_review: bool,
}

impl Default for CompletionJudgeConfig {
    fn default() -> Self {
        Self {
            min_p1_completion: 0.8,
            min_evidence_per_task: 2,
            min_sources: 2,
            semantic_review: false,
        }
    }
}

pub struct CompletionJudge {
    config: CompletionJudgeConfig,
    capability: Option<Arc<dyn ReasoningCapability>>,
}

impl CompletionJudge {
    pub fn new(config: CompletionJudgeConfig) -> Self {
        Self {
            config,
            capability: None,
        }
    }

    pub fn with_capability(mut self, capability: Arc<dyn ReasoningCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn config(&self) -> &CompletionJudgeConfig {
        &self.config
    }

    /// Deterministic checks.
    ///
    /// An empty store, or a completed task without evidence, rejects
    /// outright. Otherwise every threshold is checked and every miss is
    /// listed.
    pub fn check_evidence(&self, graph: &TaskGraph, store: &EvidenceStore) -> ValidationVerdict {
        if store.is_empty() {
            return ValidationVerdict::from_issues(
                GateKind::Completion,
                vec![VerdictIssue::new("evidence", "no evidence has been gathered")],
            );
        }

        // Superseded tasks have been replaced; their replacements are judged.
        let tasks: Vec<&Task> = graph
            .tasks()
            .into_iter()
            .filter(|t| t.superseded_by.is_none())
            .collect();
        let unsupported: Vec<VerdictIssue> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed && store.query(&t.id).next().is_none())
            .map(|t| {
                issue_for(t, "completed without any evidence record")
            })
            .collect();
        if !unsupported.is_empty() {
            return ValidationVerdict::from_issues(GateKind::Completion, unsupported);
        }

        let summary = EvidenceSummary::build(graph, store, self.config.min_sources);
        let mut issues = Vec::new();

        for task in tasks.iter().filter(|t| t.priority == Priority::P0) {
            if task.status != TaskStatus::Completed {
                issues.push(issue_for(task, &format!("P0 task is {}", task.status)));
            }
        }

        let p1: Vec<&&Task> = tasks.iter().filter(|t| t.priority == Priority::P1).collect();
        if !p1.is_empty() {
            let done = p1.iter().filter(|t| t.status == TaskStatus::Completed).count();
            let ratio = done as f64 / p1.len() as f64;
            if ratio < self.config.min_p1_completion {
                for task in p1.iter().filter(|t| t.status != TaskStatus::Completed) {
                    issues.push(issue_for(
                        task,
                        &format!(
                            "P1 completion {:.0}% is below {:.0}%",
                            ratio * 100.0,
                            self.config.min_p1_completion * 100.0
                        ),
                    ));
                }
            }
        }

        for task in tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed && t.corroborates.is_none())
        {
            let records = supporting_records(task, &tasks, &summary);
            if records < self.config.min_evidence_per_task {
                issues.push(issue_for(
                    task,
                    &format!(
                        "{} evidence record(s), need {}",
                        records, self.config.min_evidence_per_task
                    ),
                ));
            }
        }

        for contradiction in summary.unresolved_load_bearing(graph) {
            issues.push(VerdictIssue::new(
                "contradiction",
                &format!(
                    "Resolve conflicting answers to \"{}\": {}",
                    contradiction.question,
                    contradiction.answers.join(" vs ")
                ),
            ));
        }

        debug!(issues = issues.len(), records = summary.total_records, "Completion evidence checked");
        ValidationVerdict::from_issues(GateKind::Completion, issues)
    }

    /// Full gate: deterministic checks, then the semantic tier if enabled
    /// and the deterministic tier accepted.
    pub async fn judge(
        &self,
        query: &ResearchQuery,
        graph: &TaskGraph,
        store: &EvidenceStore,
    ) -> Result<ValidationVerdict> {
        let verdict = self.check_evidence(graph, store);
        if !verdict.accepted || !self.config.semantic_review {
            return Ok(verdict);
        }
        let Some(capability) = &self.capability else {
            return Ok(verdict);
        };

        let request = JudgeRequest {
            gate: GateKind::Completion,
            query: query.clone(),
            digest: evidence_digest(graph, store),
        };
        let response = capability.judge_inputs(&request).await?;
        let semantic =
            parse_gate_response(&response, GateKind::Completion)?.into_verdict(GateKind::Completion);
        info!(accepted = semantic.accepted, issues = semantic.issues.len(), "Semantic completion review");
        Ok(verdict.merge(semantic))
    }
}

fn issue_for(task: &Task, detail: &str) -> VerdictIssue {
    VerdictIssue::new(task.dimension.as_deref().unwrap_or(&task.objective), detail).for_task(task.id)
}

/// Records for a task plus those of completed tasks corroborating it.
fn supporting_records(task: &Task, tasks: &[&Task], summary: &EvidenceSummary) -> usize {
    let own = summary.for_task(&task.id).map(|e| e.records).unwrap_or(0);
    let corroborated: usize = tasks
        .iter()
        .filter(|t| t.corroborates == Some(task.id) && t.status == TaskStatus::Completed)
        .filter_map(|t| summary.for_task(&t.id))
        .map(|e| e.records)
        .sum();
    own + corroborated
}

/// Task status lines, each followed by its evidence titles and locators.
pub fn evidence_digest(graph: &TaskGraph, store: &EvidenceStore) -> String {
    let mut lines = Vec::new();
    for task in graph.tasks() {
        lines.push(format!("- [{}] {} ({})", task.priority, task.objective, task.status));
        for record in store.latest_for_task(&task.id) {
            lines.push(format!(
                "  - 【{}】 {} <{}> {}",
                record.id,
                record.display_title(),
                record.locator,
                record.reliability
            ));
        }
    }
    lines.join("\n")
}
