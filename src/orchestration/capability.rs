//! Collaborator seams.
//!
//! The crate never generates or interprets natural language itself. Planning,
//! operation proposals, and gate reviews come from a [`ReasoningCapability`];
//! searching and fetching go through a [`ResearchBackend`]; the final report
//! comes from a [`ReportWriter`].

use crate::core::dag::TaskGraph;
use crate::core::task::Task;
use crate::error::Result;
use crate::evidence::{FetchedDocument, Locator};
use crate::gates::verdict::{GateKind, ValidationVerdict};
use crate::orchestration::dispatcher::{Operation, OperationError};
use crate::orchestration::handoff::FindingsArtifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How much planning a query deserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    #[default]
    Moderate,
    Complex,
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityTier::Simple => write!(f, "simple"),
            ComplexityTier::Moderate => write!(f, "moderate"),
            ComplexityTier::Complex => write!(f, "complex"),
        }
    }
}

/// The user's research request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub text: String,
    pub complexity: ComplexityTier,
    /// Explicit requirements every plan must cover.
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ResearchQuery {
    pub fn new(text: &str, complexity: ComplexityTier) -> Self {
        Self {
            text: text.to_string(),
            complexity,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: &str) -> Self {
        self.constraints.push(constraint.to_string());
        self
    }
}

/// Where a discovery operation searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    #[default]
    Web,
    Arxiv,
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchSource::Web => write!(f, "web"),
            SearchSource::Arxiv => write!(f, "arxiv"),
        }
    }
}

/// A request for a semantic gate review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub gate: GateKind,
    pub query: ResearchQuery,
    /// Plain-text rendering of the plan or the gathered evidence.
    pub digest: String,
}

/// The natural-language reasoning capability (an LLM in practice).
///
/// Every method may fail with `CapabilityUnavailable` or
/// `MalformedResponse`; either ends the session.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Decompose a query into an initial plan.
    async fn propose_plan(&self, query: &ResearchQuery) -> Result<TaskGraph>;

    /// Produce a new plan in response to a plan-gate rejection.
    async fn revise_plan(
        &self,
        query: &ResearchQuery,
        current: &TaskGraph,
        verdict: &ValidationVerdict,
    ) -> Result<TaskGraph>;

    /// Operations that would make progress on a task. A re-queued task
    /// carries its `last_error`.
    async fn propose_operations(&self, task: &Task) -> Result<Vec<Operation>>;

    /// Pick which discovered locators are worth fetching.
    async fn select_locators(&self, task: &Task, candidates: &[Locator]) -> Result<Vec<Locator>>;

    /// Answer a gate review in tagged text.
    async fn judge_inputs(&self, request: &JudgeRequest) -> Result<String>;
}

/// Search and fetch.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Find candidate locators. Never yields evidence.
    async fn search(
        &self,
        query: &str,
        source: SearchSource,
    ) -> std::result::Result<Vec<Locator>, OperationError>;

    /// Read and parse a locator.
    async fn fetch(&self, locator: &Locator) -> std::result::Result<FetchedDocument, OperationError>;
}

/// Turns the findings artifact into a report that cites evidence ids.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write_report(&self, artifact: &FindingsArtifact) -> Result<String>;
}
