//! Session state with phase transition validation.
//!
//! `OrchestrationState` owns everything one research session accumulates:
//! the plan, the evidence, gate verdicts, counters, and the phase history.
//! Phases follow the OODA loop:
//!
//! Planning -> Observing -> Orienting -> Deciding -> Acting -> Observing ...
//!
//! Deciding or Observing may move to Converging; Converging either returns
//! to Deciding (rejected, more work) or moves to Handoff -> HandedOff. Any
//! non-terminal phase may move to HardFailed.

use crate::core::dag::{MarkOutcome, TaskGraph};
use crate::core::task::{TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::evidence::{Contradiction, EvidenceDraft, EvidenceId, EvidenceStore};
use crate::gates::ValidationVerdict;
use crate::orchestration::capability::ResearchQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Planning,
    Observing,
    Orienting,
    Deciding,
    Acting,
    Converging,
    Handoff,
    HardFailed,
    HandedOff,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::HardFailed | SessionPhase::HandedOff)
    }

    pub fn can_transition_to(self, target: SessionPhase) -> bool {
        if target == SessionPhase::HardFailed {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (SessionPhase::Planning, SessionPhase::Observing)
                | (SessionPhase::Observing, SessionPhase::Orienting)
                | (SessionPhase::Observing, SessionPhase::Converging)
                | (SessionPhase::Orienting, SessionPhase::Deciding)
                | (SessionPhase::Deciding, SessionPhase::Acting)
                | (SessionPhase::Deciding, SessionPhase::Converging)
                | (SessionPhase::Acting, SessionPhase::Observing)
                | (SessionPhase::Converging, SessionPhase::Deciding)
                | (SessionPhase::Converging, SessionPhase::Handoff)
                | (SessionPhase::Handoff, SessionPhase::HandedOff)
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Planning => "planning",
            SessionPhase::Observing => "observing",
            SessionPhase::Orienting => "orienting",
            SessionPhase::Deciding => "deciding",
            SessionPhase::Acting => "acting",
            SessionPhase::Converging => "converging",
            SessionPhase::Handoff => "handoff",
            SessionPhase::HardFailed => "hard_failed",
            SessionPhase::HandedOff => "handed_off",
        };
        write!(f, "{}", name)
    }
}

/// A record of a phase transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: SessionPhase,
    pub entered_at: DateTime<Utc>,
}

/// Limits that force convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBudget {
    pub max_iterations: u32,
    pub max_wall_clock: Duration,
    /// Consecutive cycles without information gain. 0 disables the check.
    pub max_stalled_cycles: u32,
}

impl Default for SessionBudget {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_wall_clock: Duration::from_secs(30 * 60),
            max_stalled_cycles: 3,
        }
    }
}

/// Why a session stopped before the judge was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedReason {
    IterationBudget,
    WallClockBudget,
    Stalled,
    JudgeRejectLimit,
}

impl std::fmt::Display for ForcedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForcedReason::IterationBudget => write!(f, "iteration budget exhausted"),
            ForcedReason::WallClockBudget => write!(f, "wall-clock budget exhausted"),
            ForcedReason::Stalled => write!(f, "no information gain"),
            ForcedReason::JudgeRejectLimit => write!(f, "completion judge rejection limit reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConvergenceMode {
    Natural,
    Forced { reason: ForcedReason },
}

/// How the loop ended, with anything the report should warn about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convergence {
    pub mode: ConvergenceMode,
    pub caveats: Vec<String>,
}

impl Convergence {
    pub fn is_forced(&self) -> bool {
        matches!(self.mode, ConvergenceMode::Forced { .. })
    }
}

/// What one OODA cycle achieved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub iteration: u32,
    pub operations: usize,
    pub new_records: usize,
    pub high_reliability_records: usize,
    /// High-reliability records per operation dispatched.
    pub information_gain: f64,
}

/// One research session.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    id: SessionId,
    query: ResearchQuery,
    pub(crate) graph: TaskGraph,
    pub(crate) evidence: EvidenceStore,
    phase: SessionPhase,
    phase_history: Vec<PhaseHistoryEntry>,
    started_at: Instant,
    frozen: bool,
    pub(crate) iteration: u32,
    pub(crate) plan_verdict: Option<ValidationVerdict>,
    pub(crate) completion_verdict: Option<ValidationVerdict>,
    pub(crate) plan_revisions: u32,
    pub(crate) judge_rejections: u32,
    pub(crate) contradictions: Vec<Contradiction>,
    /// Contradictions not yet given a verification task.
    pub(crate) unverified_contradictions: Vec<Contradiction>,
    /// Completed tasks whose evidence is thin.
    pub(crate) thin_tasks: Vec<TaskId>,
    pub(crate) metrics: Vec<CycleMetrics>,
    pub(crate) caveats: Vec<String>,
    pub(crate) stalled_cycles: u32,
    pub(crate) last_operations: usize,
    pub(crate) watermark: EvidenceId,
    /// Store watermark at the last early completion check.
    pub(crate) early_check_at: Option<EvidenceId>,
    pub(crate) failure: Option<String>,
}

impl OrchestrationState {
    pub fn new(query: ResearchQuery) -> Self {
        Self {
            id: SessionId::new(),
            query,
            graph: TaskGraph::new(),
            evidence: EvidenceStore::new(),
            phase: SessionPhase::Planning,
            phase_history: vec![PhaseHistoryEntry {
                phase: SessionPhase::Planning,
                entered_at: Utc::now(),
            }],
            started_at: Instant::now(),
            frozen: false,
            iteration: 0,
            plan_verdict: None,
            completion_verdict: None,
            plan_revisions: 0,
            judge_rejections: 0,
            contradictions: Vec::new(),
            unverified_contradictions: Vec::new(),
            thin_tasks: Vec::new(),
            metrics: Vec::new(),
            caveats: Vec::new(),
            stalled_cycles: 0,
            last_operations: 0,
            watermark: EvidenceId(0),
            early_check_at: None,
            failure: None,
        }
    }

    /// Check if a transition to the target phase is valid from the current phase.
    pub fn can_transition(&self, target: SessionPhase) -> bool {
        self.phase.can_transition_to(target)
    }

    /// Move to a new phase, recording it in the history.
    pub fn transition(&mut self, target: SessionPhase) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }

        debug!(session = %self.id.short(), from = %self.phase, to = %target, "Phase transition");
        self.phase = target;
        self.phase_history.push(PhaseHistoryEntry {
            phase: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    /// Record a fatal error and move to `HardFailed`.
    pub(crate) fn hard_fail(&mut self, reason: &str) {
        self.failure = Some(reason.to_string());
        if self.transition(SessionPhase::HardFailed).is_err() {
            warn!(session = %self.id.short(), phase = %self.phase, "Session already terminal");
        }
    }

    /// Stop accepting results. Used at handoff.
    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Append gathered evidence.
    ///
    /// A frozen session discards the draft and returns `None`.
    pub fn record_evidence(&mut self, draft: EvidenceDraft) -> Result<Option<EvidenceId>> {
        if self.frozen {
            warn!(
                session = %self.id.short(),
                task = %draft.task_id().short(),
                locator = %draft.locator(),
                "Discarding evidence for frozen session"
            );
            return Ok(None);
        }
        self.evidence.append(draft).map(Some)
    }

    /// Fold a dispatch into a task: completed with evidence, else blocked.
    ///
    /// A frozen session discards the result and returns `None`.
    pub(crate) fn settle_task(
        &mut self,
        id: &TaskId,
        evidence: &[EvidenceId],
        error: &str,
    ) -> Result<Option<MarkOutcome>> {
        if self.frozen {
            warn!(session = %self.id.short(), task = %id.short(), "Discarding task result for frozen session");
            return Ok(None);
        }
        let outcome = if evidence.is_empty() {
            self.graph.mark_blocked(id, error)?
        } else {
            self.graph.mark(id, TaskStatus::Completed, evidence)?
        };
        Ok(Some(outcome))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn query(&self) -> &ResearchQuery {
        &self.query
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn phase_history(&self) -> &[PhaseHistoryEntry] {
        &self.phase_history
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Completed Act phases.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn plan_verdict(&self) -> Option<&ValidationVerdict> {
        self.plan_verdict.as_ref()
    }

    pub fn completion_verdict(&self) -> Option<&ValidationVerdict> {
        self.completion_verdict.as_ref()
    }

    pub fn plan_revisions(&self) -> u32 {
        self.plan_revisions
    }

    pub fn judge_rejections(&self) -> u32 {
        self.judge_rejections
    }

    pub fn contradictions(&self) -> &[Contradiction] {
        &self.contradictions
    }

    pub fn metrics(&self) -> &[CycleMetrics] {
        &self.metrics
    }

    pub fn caveats(&self) -> &[String] {
        &self.caveats
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}
