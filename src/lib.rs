pub mod config;
pub mod core;
pub mod error;
pub mod evidence;
pub mod gates;
pub mod log;
pub mod orchestration;

pub use config::Config;
pub use error::{Error, Result};
pub use core::{MarkOutcome, Priority, Task, TaskGraph, TaskId, TaskStatus};
pub use evidence::{EvidenceId, EvidenceRecord, EvidenceStore, Locator, ReliabilityTier};
pub use orchestration::{
    Convergence, ConvergenceMode, FindingsArtifact, HandoffCoordinator, OodaExecutor,
    OrchestrationState, ResearchQuery, SessionOutcome, SessionPhase, ToolDispatcher,
};
