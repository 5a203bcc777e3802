//! Orchestration layer for delve research sessions.
//!
//! This module holds the OODA executor that drives a session, the tool
//! dispatcher that runs search and fetch operations in parallel, the
//! session state machine, the handoff coordinator, and the traits the
//! executor uses to reach its external collaborators.

pub mod capability;
pub mod dispatcher;
pub mod executor;
pub mod handoff;
pub mod state;

pub use capability::{
    ComplexityTier, JudgeRequest, ReasoningCapability, ReportWriter, ResearchBackend,
    ResearchQuery, SearchSource,
};
pub use dispatcher::{
    DispatcherConfig, Operation, OperationError, OperationErrorKind, OperationId, OperationKind,
    OperationOutput, OperationResult, RetryPolicy, ToolDispatcher,
};
pub use executor::{ExecutorConfig, OodaExecutor, SessionOutcome, SessionReport};
pub use handoff::{
    Confidence, EvidenceEntry, FindingsArtifact, HandoffConfig, HandoffCoordinator,
    HandoffOutcome, TaskFindings,
};
pub use state::{
    Convergence, ConvergenceMode, CycleMetrics, ForcedReason, OrchestrationState,
    PhaseHistoryEntry, SessionBudget, SessionId, SessionPhase,
};
