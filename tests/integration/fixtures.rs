#![allow(dead_code)]

//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted reasoning capability
//! - A mock research backend with per-locator failure scripts
//! - A report writer that cites every evidence entry
//! - Predefined plans

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use delve::core::{Priority, Task, TaskGraph, TaskId};
use delve::evidence::{FetchedDocument, Locator, ReliabilityTier};
use delve::gates::{GateKind, ValidationVerdict};
use delve::orchestration::{
    ComplexityTier, DispatcherConfig, ExecutorConfig, FindingsArtifact, JudgeRequest, OodaExecutor,
    Operation, OperationError, ReasoningCapability, ReportWriter, ResearchBackend, ResearchQuery,
    RetryPolicy, SearchSource, ToolDispatcher,
};
use delve::{Error, Result};

/// How the scripted capability answers `select_locators`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Fetch every discovered candidate.
    All,
    /// Fetch nothing.
    Nothing,
}

/// A reasoning capability that replays a fixed plan.
///
/// Every task gets one web discovery operation whose query is the task's
/// objective. Gate responses are taken from a queue; an empty queue
/// accepts.
pub struct ScriptedCapability {
    plan: TaskGraph,
    revised: Mutex<VecDeque<TaskGraph>>,
    judge_responses: Mutex<VecDeque<String>>,
    selection: Selection,
    pub judge_calls: AtomicU32,
    pub revise_calls: AtomicU32,
    /// `last_error` of every task handed to `propose_operations`, by objective.
    pub seen_errors: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedCapability {
    pub fn new(plan: TaskGraph) -> Self {
        Self {
            plan,
            revised: Mutex::new(VecDeque::new()),
            judge_responses: Mutex::new(VecDeque::new()),
            selection: Selection::All,
            judge_calls: AtomicU32::new(0),
            revise_calls: AtomicU32::new(0),
            seen_errors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_revision(self, plan: TaskGraph) -> Self {
        self.revised.lock().unwrap().push_back(plan);
        self
    }

    pub fn with_judge_response(self, response: &str) -> Self {
        self.judge_responses.lock().unwrap().push_back(response.to_string());
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedCapability {
    async fn propose_plan(&self, _query: &ResearchQuery) -> Result<TaskGraph> {
        Ok(self.plan.clone())
    }

    async fn revise_plan(
        &self,
        _query: &ResearchQuery,
        current: &TaskGraph,
        _verdict: &ValidationVerdict,
    ) -> Result<TaskGraph> {
        self.revise_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .revised
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| current.clone()))
    }

    async fn propose_operations(&self, task: &Task) -> Result<Vec<Operation>> {
        self.seen_errors
            .lock()
            .unwrap()
            .push((task.objective.clone(), task.last_error.clone()));
        Ok(vec![Operation::discovery(task.id, &task.objective, SearchSource::Web)])
    }

    async fn select_locators(&self, _task: &Task, candidates: &[Locator]) -> Result<Vec<Locator>> {
        Ok(match self.selection {
            Selection::All => candidates.to_vec(),
            Selection::Nothing => Vec::new(),
        })
    }

    async fn judge_inputs(&self, request: &JudgeRequest) -> Result<String> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.judge_responses.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| match request.gate {
            GateKind::Plan => "<validation_result>true</validation_result>".to_string(),
            GateKind::Completion => "<judge_result>true</judge_result>".to_string(),
        }))
    }
}

/// A capability whose every call fails.
pub struct OfflineCapability;

#[async_trait]
impl ReasoningCapability for OfflineCapability {
    async fn propose_plan(&self, _query: &ResearchQuery) -> Result<TaskGraph> {
        Err(Error::CapabilityUnavailable("connection refused".to_string()))
    }

    async fn revise_plan(
        &self,
        _query: &ResearchQuery,
        _current: &TaskGraph,
        _verdict: &ValidationVerdict,
    ) -> Result<TaskGraph> {
        Err(Error::CapabilityUnavailable("connection refused".to_string()))
    }

    async fn propose_operations(&self, _task: &Task) -> Result<Vec<Operation>> {
        Err(Error::CapabilityUnavailable("connection refused".to_string()))
    }

    async fn select_locators(&self, _task: &Task, _candidates: &[Locator]) -> Result<Vec<Locator>> {
        Err(Error::CapabilityUnavailable("connection refused".to_string()))
    }

    async fn judge_inputs(&self, _request: &JudgeRequest) -> Result<String> {
        Err(Error::CapabilityUnavailable("connection refused".to_string()))
    }
}

/// A mock search and fetch backend.
///
/// Searching for a query yields `sources` locators of the form
/// `https://web.example/<slug>/<n>`. Fetches succeed with a `secondary`
/// document unless a failure script is registered for the locator.
pub struct MockBackend {
    sources: usize,
    failures: Mutex<HashMap<String, VecDeque<OperationError>>>,
    fetch_delay: Option<Duration>,
    cancel_on_search: Option<CancellationToken>,
    pub searches: AtomicUsize,
    pub fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MockBackend {
    pub fn new(sources: usize) -> Self {
        Self {
            sources,
            failures: Mutex::new(HashMap::new()),
            fetch_delay: None,
            cancel_on_search: None,
            searches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail the next fetches of `locator` with these errors, in order.
    pub fn failing(self, locator: &str, errors: Vec<OperationError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(locator.to_string(), errors.into_iter().collect());
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Cancel the token on the first search.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_search = Some(token);
        self
    }
}

/// Locator the mock backend returns as the `n`th hit for a query.
pub fn locator_for(query: &str, n: usize) -> Locator {
    Locator(format!("https://web.example/{}/{n}", slug(query)))
}

pub fn slug(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl ResearchBackend for MockBackend {
    async fn search(
        &self,
        query: &str,
        _source: SearchSource,
    ) -> std::result::Result<Vec<Locator>, OperationError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_search {
            token.cancel();
        }
        Ok((1..=self.sources).map(|n| locator_for(query, n)).collect())
    }

    async fn fetch(&self, locator: &Locator) -> std::result::Result<FetchedDocument, OperationError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(locator.as_str())
            .and_then(VecDeque::pop_front);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match scripted {
            Some(err) => Err(err),
            None => Ok(FetchedDocument::new(
                &format!("Findings from {locator}.\n\nSecond paragraph."),
                ReliabilityTier::Secondary,
            )
            .with_title(&format!("Source {}", locator.as_str().rsplit('/').next().unwrap_or("?")))),
        }
    }
}

/// Writes one line per task citing every evidence entry.
pub struct CitingWriter;

#[async_trait]
impl ReportWriter for CitingWriter {
    async fn write_report(&self, artifact: &FindingsArtifact) -> Result<String> {
        let mut lines = vec![format!("# {}", artifact.query)];
        for task in &artifact.tasks {
            let ids: Vec<String> = task.evidence.iter().map(|e| e.id.to_string()).collect();
            if ids.is_empty() {
                lines.push(format!("- {} (no evidence)", task.objective));
            } else {
                lines.push(format!("- {} 【{}】", task.objective, ids.join(", ")));
            }
        }
        Ok(lines.join("\n"))
    }
}

/// A writer that cites an id no session will have.
pub struct FabricatingWriter;

#[async_trait]
impl ReportWriter for FabricatingWriter {
    async fn write_report(&self, _artifact: &FindingsArtifact) -> Result<String> {
        Ok("The market doubled 【999】.".to_string())
    }
}

pub fn query(complexity: ComplexityTier) -> ResearchQuery {
    ResearchQuery::new("electric vehicle battery supply chains", complexity)
}

/// A, B independent; C depends on both.
pub struct DiamondPlan {
    pub graph: TaskGraph,
    pub a: TaskId,
    pub b: TaskId,
    pub c: TaskId,
}

pub fn diamond_plan() -> DiamondPlan {
    let mut graph = TaskGraph::new();
    let a = graph
        .insert(
            Task::new("lithium mining output", Priority::P0).with_dimension("supply"),
            &[],
        )
        .unwrap();
    let b = graph
        .insert(
            Task::new("cathode manufacturing capacity", Priority::P1).with_dimension("manufacturing"),
            &[],
        )
        .unwrap();
    let c = graph
        .insert(
            Task::new("bottlenecks across the chain", Priority::P1).with_dimension("synthesis"),
            &[a, b],
        )
        .unwrap();
    DiamondPlan { graph, a, b, c }
}

/// `n` tasks, each depending on the previous. The first is P0.
pub fn chain_plan(n: usize) -> (TaskGraph, Vec<TaskId>) {
    let mut graph = TaskGraph::new();
    let mut ids: Vec<TaskId> = Vec::new();
    for i in 0..n {
        let priority = if i == 0 { Priority::P0 } else { Priority::P1 };
        let task = Task::new(&format!("chain step {i}"), priority).with_dimension("supply");
        let deps: Vec<TaskId> = ids.last().copied().into_iter().collect();
        ids.push(graph.insert(task, &deps).unwrap());
    }
    (graph, ids)
}

pub fn fast_dispatch() -> DispatcherConfig {
    DispatcherConfig {
        max_parallel: 4,
        operation_timeout: Duration::from_secs(5),
        batch_timeout: Duration::from_secs(60),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
        },
    }
}

pub fn executor(
    capability: Arc<ScriptedCapability>,
    backend: Arc<MockBackend>,
    config: ExecutorConfig,
) -> OodaExecutor {
    OodaExecutor::new(capability, ToolDispatcher::new(backend, fast_dispatch()), config)
}
