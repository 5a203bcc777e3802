//! Handoff to the report writer.
//!
//! The `HandoffCoordinator` packages a converged session into a
//! `FindingsArtifact`, freezes the session, and checks every citation in the
//! report that comes back.

use crate::core::task::{Priority, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::evidence::{
    assess_sufficiency, resolve_report, Contradiction, EvidenceId, Locator, ReliabilitySummary,
    ReliabilityTier, ResolvedReport, Sufficiency,
};
use crate::orchestration::capability::ReportWriter;
use crate::orchestration::state::{Convergence, ConvergenceMode, OrchestrationState, SessionId, SessionPhase};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Completed with sufficient evidence.
    High,
    /// Completed, but thinly sourced.
    Medium,
    /// Not completed.
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub id: EvidenceId,
    pub locator: Locator,
    pub title: Option<String>,
    pub excerpt: String,
    pub reliability_tier: ReliabilityTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFindings {
    pub task_id: TaskId,
    pub objective: String,
    pub priority: Priority,
    pub dimension: Option<String>,
    pub status: TaskStatus,
    pub confidence: Confidence,
    pub evidence: Vec<EvidenceEntry>,
}

/// The sole payload handed to the report writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingsArtifact {
    pub session_id: SessionId,
    pub query: String,
    /// Tasks in plan order.
    pub tasks: Vec<TaskFindings>,
    /// Contradictions primary sources have not settled.
    pub contradictions: Vec<Contradiction>,
    pub incomplete_tasks: Vec<TaskId>,
    pub reliability: ReliabilitySummary,
    pub convergence: ConvergenceMode,
    pub caveats: Vec<String>,
}

impl FindingsArtifact {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskFindings> {
        self.tasks.iter().find(|t| t.task_id == *id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffConfig {
    pub max_excerpt_chars: usize,
    /// Distinct locators needed for `high` confidence.
    pub min_sources: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 500,
            min_sources: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoffOutcome {
    pub artifact: FindingsArtifact,
    pub report: ResolvedReport,
}

#[derive(Debug, Clone, Default)]
pub struct HandoffCoordinator {
    config: HandoffConfig,
}

impl HandoffCoordinator {
    pub fn new(config: HandoffConfig) -> Self {
        Self { config }
    }

    /// Build the findings artifact.
    ///
    /// Every attached evidence id is resolved against the store; a dangling
    /// id is an error. Superseded records are left out.
    pub fn package(&self, state: &OrchestrationState, convergence: &Convergence) -> Result<FindingsArtifact> {
        let store = state.evidence();
        let mut tasks = Vec::new();
        let mut incomplete_tasks = Vec::new();

        for task in state.graph().tasks() {
            let mut evidence = Vec::new();
            for id in &task.evidence {
                let record = store.resolve(*id)?;
                if store.is_superseded(record.id) {
                    continue;
                }
                evidence.push(EvidenceEntry {
                    id: record.id,
                    locator: record.locator.clone(),
                    title: record.title.clone(),
                    excerpt: record.excerpt(self.config.max_excerpt_chars),
                    reliability_tier: record.reliability,
                });
            }

            let confidence = if task.status != TaskStatus::Completed {
                incomplete_tasks.push(task.id);
                Confidence::Low
            } else if assess_sufficiency(store, &task.id, self.config.min_sources).sufficiency
                == Sufficiency::Sufficient
            {
                Confidence::High
            } else {
                Confidence::Medium
            };

            tasks.push(TaskFindings {
                task_id: task.id,
                objective: task.objective.clone(),
                priority: task.priority,
                dimension: task.dimension.clone(),
                status: task.status,
                confidence,
                evidence,
            });
        }

        let mut caveats: Vec<String> = state.caveats().to_vec();
        for caveat in &convergence.caveats {
            if !caveats.contains(caveat) {
                caveats.push(caveat.clone());
            }
        }

        Ok(FindingsArtifact {
            session_id: state.id(),
            query: state.query().text.clone(),
            tasks,
            contradictions: state
                .contradictions()
                .iter()
                .filter(|c| !c.resolved)
                .cloned()
                .collect(),
            incomplete_tasks,
            reliability: store.reliability_summary(),
            convergence: convergence.mode,
            caveats,
        })
    }

    /// Freeze the session, hand the artifact to the writer, and resolve
    /// every citation in the returned report.
    ///
    /// # Errors
    /// - `InvalidPhaseTransition` unless the session is in `Handoff`
    /// - `ReportWriter` if the writer fails
    /// - `DanglingCitation` for any unresolvable token in the report
    pub async fn handoff(
        &self,
        artifact: FindingsArtifact,
        state: &mut OrchestrationState,
        writer: &dyn ReportWriter,
    ) -> Result<HandoffOutcome> {
        if !state.can_transition(SessionPhase::HandedOff) {
            return Err(Error::InvalidPhaseTransition {
                from: state.phase().to_string(),
                to: SessionPhase::HandedOff.to_string(),
            });
        }
        state.freeze();
        state.transition(SessionPhase::HandedOff)?;

        info!(
            session = %state.id().short(),
            tasks = artifact.tasks.len(),
            incomplete = artifact.incomplete_tasks.len(),
            "Handing off findings"
        );
        let text = writer.write_report(&artifact).await.map_err(|err| match err {
            Error::ReportWriter(_) => err,
            other => Error::ReportWriter(other.to_string()),
        })?;
        let report = resolve_report(&text, state.evidence())?;

        Ok(HandoffOutcome { artifact, report })
    }
}
