//! Task data model for the research plan.
//!
//! Tasks are the atomic units of planned research work. Each task tracks
//! its objective, priority, status, the evidence it produced, and how many
//! times it has been dispatched.

use crate::evidence::EvidenceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task within a research plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task priority. `P0` is the most severe and sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    /// One level more severe, saturating at `P0`.
    pub fn raised(self) -> Self {
        match self {
            Priority::P0 | Priority::P1 => Priority::P0,
            Priority::P2 => Priority::P1,
            Priority::P3 => Priority::P2,
        }
    }

    /// P0 and P1 tasks carry the research; the completion gate holds them
    /// to stricter thresholds.
    pub fn is_load_bearing(self) -> bool {
        matches!(self, Priority::P0 | Priority::P1)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::P0 => write!(f, "P0"),
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::P3 => write!(f, "P3"),
        }
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created, dependencies possibly unmet.
    #[default]
    Pending,
    /// Dependencies satisfied, waiting to be dispatched.
    Ready,
    /// Operations for this task are in flight.
    InProgress,
    /// Last dispatch produced no evidence; may be re-queued.
    Blocked,
    /// Task produced evidence and is done.
    Completed,
    /// Task exhausted its attempts.
    Failed,
}

impl TaskStatus {
    /// Completed and Failed are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the task has been dispatched at least once.
    pub fn has_started(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Ready)
    }

    /// Check the executor-facing transition table.
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Pending, TaskStatus::Ready)
                | (TaskStatus::Ready, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Blocked)
                | (TaskStatus::Blocked, TaskStatus::Ready)
                | (TaskStatus::Blocked, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single task in the research plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// What the task should find out.
    pub objective: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Research dimension this task covers (e.g. "market size", "regulation").
    pub dimension: Option<String>,
    /// Completed task whose evidence this task adds to.
    #[serde(default)]
    pub corroborates: Option<TaskId>,
    /// Replacement task, set when this task failed and was superseded.
    #[serde(default)]
    pub superseded_by: Option<TaskId>,
    /// Current execution status.
    pub status: TaskStatus,
    /// Tasks that must complete first, in insertion order.
    pub dependencies: Vec<TaskId>,
    /// Evidence records produced while executing this task.
    pub evidence: Vec<EvidenceId>,
    /// Number of times the task has been dispatched.
    pub attempts: u32,
    /// Summary of the most recent dispatch failure.
    pub last_error: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was first dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(objective: &str, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            objective: objective.to_string(),
            priority,
            dimension: None,
            corroborates: None,
            superseded_by: None,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            evidence: Vec::new(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Builder: tag the task with a research dimension.
    pub fn with_dimension(mut self, dimension: &str) -> Self {
        self.dimension = Some(dimension.to_string());
        self
    }

    /// A follow-up that gathers more sources for a thinly supported task.
    pub fn corroborating(target: &Task) -> Self {
        let mut task = Task::new(&format!("Corroborate: {}", target.objective), target.priority);
        task.dimension = target.dimension.clone();
        task.corroborates = Some(target.id);
        task
    }

    /// Start a dispatch: bumps the attempt counter.
    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.attempts += 1;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.last_error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn block(&mut self, reason: &str) {
        self.status = TaskStatus::Blocked;
        self.last_error = Some(reason.to_string());
    }

    pub(crate) fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task can be dispatched (Pending or Ready).
    pub fn can_start(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Ready)
    }
}
