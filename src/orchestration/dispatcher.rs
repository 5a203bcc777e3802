//! Tool dispatcher for parallel research operations.
//!
//! The `ToolDispatcher` runs a batch of operations against the research
//! backend with bounded concurrency, retries transient failures with
//! exponential backoff, and returns one result per operation in submission
//! order once every operation has settled.

use crate::core::task::TaskId;
use crate::evidence::{EvidenceDraft, Locator};
use crate::orchestration::capability::{ResearchBackend, SearchSource};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// Search for candidate locators.
    Discovery { query: String, source: SearchSource },
    /// Fetch and read one locator.
    EvidenceGathering { locator: Locator },
}

/// One unit of external work on behalf of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub task_id: TaskId,
    pub kind: OperationKind,
}

impl Operation {
    pub fn discovery(task_id: TaskId, query: &str, source: SearchSource) -> Self {
        Self {
            id: OperationId::new(),
            task_id,
            kind: OperationKind::Discovery {
                query: query.to_string(),
                source,
            },
        }
    }

    pub fn gather(task_id: TaskId, locator: Locator) -> Self {
        Self {
            id: OperationId::new(),
            task_id,
            kind: OperationKind::EvidenceGathering { locator },
        }
    }

    pub fn is_discovery(&self) -> bool {
        matches!(self.kind, OperationKind::Discovery { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    Timeout,
    RateLimited,
    Unreachable,
    ParseFailure,
}

impl OperationErrorKind {
    /// Timeouts and rate limits are worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(self, OperationErrorKind::Timeout | OperationErrorKind::RateLimited)
    }
}

impl std::fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationErrorKind::Timeout => write!(f, "timeout"),
            OperationErrorKind::RateLimited => write!(f, "rate limited"),
            OperationErrorKind::Unreachable => write!(f, "unreachable"),
            OperationErrorKind::ParseFailure => write!(f, "parse failure"),
        }
    }
}

/// A failed operation. Not a crate error: it is folded into task status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::RateLimited, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Unreachable, message)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::ParseFailure, message)
    }
}

/// What a successful operation produced.
///
/// Discovery yields locators only; only a fetch yields an evidence draft.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    Discovered { candidates: Vec<Locator> },
    Gathered(EvidenceDraft),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation: Operation,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub outcome: std::result::Result<OperationOutput, OperationError>,
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): initial, then doubling.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub max_parallel: usize,
    /// Deadline for a single attempt.
    pub operation_timeout: Duration,
    /// Deadline for a whole batch, retries included.
    pub batch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            operation_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ToolDispatcher {
    backend: Arc<dyn ResearchBackend>,
    config: DispatcherConfig,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn ResearchBackend>, config: DispatcherConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run every operation and wait for all of them to settle.
    ///
    /// At most `max_parallel` operations are in flight at once. A failing or
    /// slow operation never holds up its siblings beyond the batch deadline.
    /// Results come back in submission order.
    pub async fn dispatch_batch(&self, operations: Vec<Operation>) -> Vec<OperationResult> {
        if operations.is_empty() {
            return Vec::new();
        }

        let count = operations.len();
        let deadline = Instant::now() + self.config.batch_timeout;
        debug!(operations = count, max_parallel = self.config.max_parallel, "Dispatching batch");

        let mut settled: Vec<(usize, OperationResult)> = stream::iter(operations.into_iter().enumerate())
            .map(|(index, operation)| async move { (index, self.run_until(operation, deadline).await) })
            .buffer_unordered(self.config.max_parallel.max(1))
            .collect()
            .await;

        settled.sort_by_key(|(index, _)| *index);
        let results: Vec<OperationResult> = settled.into_iter().map(|(_, result)| result).collect();

        let failures = results.iter().filter(|r| r.outcome.is_err()).count();
        debug!(operations = count, failures, "Batch settled");
        results
    }

    async fn run_until(&self, operation: Operation, deadline: Instant) -> OperationResult {
        let mut attempts = 0;
        let settled = timeout_at(deadline, self.run_with_retry(&operation, &mut attempts)).await;
        let outcome = match settled {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(operation = %operation.id.short(), attempts, "Batch deadline exceeded");
                Err(OperationError::timeout("batch deadline exceeded"))
            }
        };

        OperationResult {
            operation,
            attempts,
            outcome,
        }
    }

    async fn run_with_retry(
        &self,
        operation: &Operation,
        attempts: &mut u32,
    ) -> std::result::Result<OperationOutput, OperationError> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        loop {
            *attempts += 1;
            let result = match timeout(self.config.operation_timeout, self.execute(operation)).await {
                Ok(result) => result,
                Err(_) => Err(OperationError::timeout(format!(
                    "no response within {}s",
                    self.config.operation_timeout.as_secs_f64()
                ))),
            };

            match result {
                Ok(output) => return Ok(output),
                Err(err) if err.kind.is_transient() && *attempts < max_attempts => {
                    let backoff = self.config.retry.backoff_for(*attempts);
                    warn!(
                        operation = %operation.id.short(),
                        attempt = *attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    debug!(operation = %operation.id.short(), attempts = *attempts, error = %err, "Operation failed");
                    return Err(err);
                }
            }
        }
    }

    async fn execute(&self, operation: &Operation) -> std::result::Result<OperationOutput, OperationError> {
        match &operation.kind {
            OperationKind::Discovery { query, source } => {
                let candidates = self.backend.search(query, *source).await?;
                Ok(OperationOutput::Discovered { candidates })
            }
            OperationKind::EvidenceGathering { locator } => {
                let document = self.backend.fetch(locator).await?;
                if document.text.trim().is_empty() {
                    return Err(OperationError::parse_failure(format!("{} has no readable text", locator)));
                }
                Ok(OperationOutput::Gathered(EvidenceDraft::from_fetch(
                    operation.task_id,
                    locator.clone(),
                    document,
                )))
            }
        }
    }
}
