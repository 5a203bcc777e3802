use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};
use crate::evidence::EvidenceId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Adding dependency from {from} to {to} would create a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("Dependency {dependency} not found in task graph")]
    UnknownDependency { dependency: TaskId },

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task {id} is {status} and cannot be modified")]
    ImmutableState { id: TaskId, status: TaskStatus },

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {0} has unmet dependencies")]
    DependenciesUnmet(TaskId),

    #[error("Dangling citation: {0}")]
    DanglingCitation(String),

    #[error("Evidence record not found: {0}")]
    EvidenceNotFound(EvidenceId),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Session is frozen after handoff")]
    SessionFrozen,

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Malformed capability response: {0}")]
    MalformedResponse(String),

    #[error("Report writer failed: {0}")]
    ReportWriter(String),

    #[error("Session cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error came from the opaque reasoning capability.
    pub fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Error::CapabilityUnavailable(_) | Error::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
