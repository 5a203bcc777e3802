//! OODA executor: the research control loop.
//!
//! The executor drives one `OrchestrationState` through
//! Planning -> (Observe -> Orient -> Decide -> Act)* -> Converging -> Handoff.
//! It is the only writer of session state; the Act phase fans out through
//! the `ToolDispatcher` and folds the settled batch back into the task graph.

use crate::config::Config;
use crate::core::dag::{MarkOutcome, TaskGraph, DEFAULT_MAX_ATTEMPTS};
use crate::core::task::{Priority, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::evidence::{
    assess_sufficiency, detect_contradictions, EvidenceId, Locator, Sufficiency,
};
use crate::gates::{
    CompletionJudge, CompletionJudgeConfig, PlanValidator, PlanValidatorConfig, ValidationVerdict,
};
use crate::orchestration::capability::{ReasoningCapability, ResearchBackend, ResearchQuery};
use crate::orchestration::dispatcher::{
    Operation, OperationKind, OperationOutput, OperationResult, ToolDispatcher,
};
use crate::orchestration::state::{
    Convergence, ConvergenceMode, CycleMetrics, ForcedReason, OrchestrationState, SessionBudget,
    SessionPhase,
};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub budget: SessionBudget,
    /// Plan-gate rejections answered with `revise_plan` before proceeding anyway.
    pub max_plan_revisions: u32,
    /// Completion-gate rejections that re-enter Decide before forcing convergence.
    pub max_judge_rejections: u32,
    /// Tasks taken from the ready set per Act phase.
    pub max_batch_tasks: usize,
    pub max_locators_per_task: usize,
    pub max_task_attempts: u32,
    /// Consult the judge as soon as every P0/P1 task is complete.
    pub early_completion_check: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            budget: SessionBudget::default(),
            max_plan_revisions: 3,
            max_judge_rejections: 5,
            max_batch_tasks: 4,
            max_locators_per_task: 3,
            max_task_attempts: DEFAULT_MAX_ATTEMPTS,
            early_completion_check: true,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The loop converged and the session is ready for handoff.
    Converged(Convergence),
    /// The session stopped on an error or cancellation.
    HardFailed(String),
}

impl SessionOutcome {
    pub fn convergence(&self) -> Option<&Convergence> {
        match self {
            SessionOutcome::Converged(convergence) => Some(convergence),
            SessionOutcome::HardFailed(_) => None,
        }
    }
}

/// Final state of a session together with how it ended.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: OrchestrationState,
    pub outcome: SessionOutcome,
}

/// What Converging was entered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// No schedulable work remains.
    Exhausted,
    /// A session budget ran out.
    Budget(ForcedReason),
    /// Every load-bearing task is complete; ask before spending more.
    Early,
}

enum Decision {
    Act(Vec<TaskId>),
    EarlyCheck,
    Exhausted,
}

/// Per-task results of one Act phase.
#[derive(Debug, Default)]
struct TaskFold {
    evidence: Vec<EvidenceId>,
    errors: Vec<String>,
    discovered: Vec<Locator>,
    fetched: HashSet<Locator>,
}

impl TaskFold {
    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            if self.discovered.is_empty() {
                "no sources discovered".to_string()
            } else {
                "no evidence gathered".to_string()
            }
        } else {
            self.errors.join("; ")
        }
    }
}

pub struct OodaExecutor {
    capability: Arc<dyn ReasoningCapability>,
    dispatcher: ToolDispatcher,
    plan_validator: PlanValidator,
    judge: CompletionJudge,
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl OodaExecutor {
    /// Create an executor with default gates wired to the capability.
    pub fn new(
        capability: Arc<dyn ReasoningCapability>,
        dispatcher: ToolDispatcher,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            plan_validator: PlanValidator::new(PlanValidatorConfig::default())
                .with_capability(capability.clone()),
            judge: CompletionJudge::new(CompletionJudgeConfig::default())
                .with_capability(capability.clone()),
            capability,
            dispatcher,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Build every component from a loaded configuration.
    pub fn from_config(
        config: &Config,
        capability: Arc<dyn ReasoningCapability>,
        backend: Arc<dyn ResearchBackend>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(backend, config.dispatcher_config());
        Self::new(capability.clone(), dispatcher, config.executor_config())
            .with_plan_validator(
                PlanValidator::new(config.plan_validator_config()).with_capability(capability.clone()),
            )
            .with_judge(CompletionJudge::new(config.completion_judge_config()).with_capability(capability))
    }

    pub fn with_plan_validator(mut self, validator: PlanValidator) -> Self {
        self.plan_validator = validator;
        self
    }

    pub fn with_judge(mut self, judge: CompletionJudge) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the session after the current batch settles.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a fresh session for the query.
    pub async fn research(&self, query: ResearchQuery) -> SessionReport {
        let mut state = OrchestrationState::new(query);
        let outcome = self.run(&mut state).await;
        SessionReport { state, outcome }
    }

    /// Drive a session until it converges or fails.
    ///
    /// On convergence the session is left in `Handoff`. Any error moves it
    /// to `HardFailed` with the error recorded.
    pub async fn run(&self, state: &mut OrchestrationState) -> SessionOutcome {
        match self.drive(state).await {
            Ok(convergence) => {
                info!(
                    session = %state.id().short(),
                    iterations = state.iteration(),
                    records = state.evidence().len(),
                    forced = convergence.is_forced(),
                    "Session converged"
                );
                SessionOutcome::Converged(convergence)
            }
            Err(err) => {
                error!(session = %state.id().short(), phase = %state.phase(), error = %err, "Session failed");
                let reason = err.to_string();
                state.hard_fail(&reason);
                SessionOutcome::HardFailed(reason)
            }
        }
    }

    async fn drive(&self, state: &mut OrchestrationState) -> Result<Convergence> {
        if state.is_frozen() {
            return Err(Error::SessionFrozen);
        }
        let mut stop = Stop::Exhausted;
        loop {
            if self.cancel.is_cancelled() {
                warn!(session = %state.id().short(), phase = %state.phase(), "Session cancelled");
                return Err(Error::Cancelled);
            }

            match state.phase() {
                SessionPhase::Planning => self.plan(state).await?,
                SessionPhase::Observing => match self.observe(state) {
                    Some(reason) => {
                        stop = Stop::Budget(reason);
                        state.transition(SessionPhase::Converging)?;
                    }
                    None => state.transition(SessionPhase::Orienting)?,
                },
                SessionPhase::Orienting => {
                    self.orient(state);
                    state.transition(SessionPhase::Deciding)?;
                }
                SessionPhase::Deciding => match self.decide(state)? {
                    Decision::Act(batch) => {
                        state.transition(SessionPhase::Acting)?;
                        self.act(state, batch).await?;
                        state.transition(SessionPhase::Observing)?;
                    }
                    Decision::EarlyCheck => {
                        stop = Stop::Early;
                        state.transition(SessionPhase::Converging)?;
                    }
                    Decision::Exhausted => {
                        stop = Stop::Exhausted;
                        state.transition(SessionPhase::Converging)?;
                    }
                },
                SessionPhase::Converging => {
                    if let Some(convergence) = self.converge(state, stop).await? {
                        state.transition(SessionPhase::Handoff)?;
                        return Ok(convergence);
                    }
                }
                phase => {
                    return Err(Error::InvalidPhaseTransition {
                        from: phase.to_string(),
                        to: SessionPhase::Observing.to_string(),
                    })
                }
            }
        }
    }

    async fn plan(&self, state: &mut OrchestrationState) -> Result<()> {
        info!(session = %state.id().short(), query = %state.query().text, "Planning research");
        let mut graph = self.capability.propose_plan(state.query()).await?;

        loop {
            let verdict = self.plan_validator.validate(state.query(), &graph).await?;
            let accepted = verdict.accepted;
            state.plan_verdict = Some(verdict.clone());
            if accepted {
                break;
            }
            if state.plan_revisions >= self.config.max_plan_revisions {
                warn!(
                    revisions = state.plan_revisions,
                    issues = verdict.issues.len(),
                    "Plan still rejected; proceeding"
                );
                state.caveats.push(format!(
                    "Plan accepted with low confidence after {} revision(s): {}",
                    state.plan_revisions,
                    issue_summary(&verdict)
                ));
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            state.plan_revisions += 1;
            info!(revision = state.plan_revisions, issues = verdict.issues.len(), "Revising plan");
            graph = self.capability.revise_plan(state.query(), &graph, &verdict).await?;
        }

        graph.set_max_attempts(self.config.max_task_attempts);
        info!(tasks = graph.task_count(), dependencies = graph.dependency_count(), "Plan adopted");
        state.graph = graph;
        state.transition(SessionPhase::Observing)
    }

    /// Promote ready work, measure the last cycle, and check budgets.
    fn observe(&self, state: &mut OrchestrationState) -> Option<ForcedReason> {
        let promoted = state.graph.promote_ready();

        let fresh = state.evidence.since(state.watermark);
        let new_records = fresh.len();
        let high = fresh.iter().filter(|r| r.reliability.is_high()).count();
        state.watermark = state.evidence.watermark();

        // Stall counting starts with the first Act.
        if state.iteration > 0 {
            let operations = state.last_operations;
            let information_gain = high as f64 / operations.max(1) as f64;
            state.metrics.push(CycleMetrics {
                iteration: state.iteration,
                operations,
                new_records,
                high_reliability_records: high,
                information_gain,
            });
            if high > 0 {
                state.stalled_cycles = 0;
            } else {
                state.stalled_cycles += 1;
            }
            debug!(
                iteration = state.iteration,
                promoted = promoted.len(),
                new_records,
                gain = information_gain,
                stalled = state.stalled_cycles,
                "Observed cycle"
            );
        }

        if !state.graph.has_schedulable_work() {
            return None;
        }

        let budget = &self.config.budget;
        let reason = if state.iteration >= budget.max_iterations {
            Some(ForcedReason::IterationBudget)
        } else if state.elapsed() >= budget.max_wall_clock {
            Some(ForcedReason::WallClockBudget)
        } else if budget.max_stalled_cycles > 0 && state.stalled_cycles >= budget.max_stalled_cycles {
            Some(ForcedReason::Stalled)
        } else {
            None
        };
        if let Some(reason) = reason {
            warn!(session = %state.id().short(), iteration = state.iteration, %reason, "Budget exhausted");
        }
        reason
    }

    /// Flag new contradictions and classify completed evidence.
    fn orient(&self, state: &mut OrchestrationState) {
        let found = detect_contradictions(&state.evidence);
        for contradiction in found.iter().filter(|c| !c.resolved) {
            let known = state
                .contradictions
                .iter()
                .any(|k| k.question == contradiction.question && !k.resolved);
            if !known {
                info!(
                    question = %contradiction.question,
                    answers = contradiction.answers.len(),
                    "Contradiction flagged"
                );
                state.unverified_contradictions.push(contradiction.clone());
            }
        }
        state.contradictions = found;

        let min_sources = self.judge.config().min_sources;
        let thin: Vec<TaskId> = state
            .graph
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter(|t| assess_sufficiency(&state.evidence, &t.id, min_sources).sufficiency == Sufficiency::Thin)
            .map(|t| t.id)
            .collect();
        if !thin.is_empty() {
            debug!(count = thin.len(), "Completed tasks with thin evidence");
        }
        state.thin_tasks = thin;
    }

    fn decide(&self, state: &mut OrchestrationState) -> Result<Decision> {
        let mut changed = false;

        let blocked: Vec<TaskId> = state
            .graph
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.id)
            .collect();
        for id in blocked {
            if state.graph.mark(&id, TaskStatus::Ready, &[])? == MarkOutcome::ForcedFailed {
                changed = true;
            }
        }

        for contradiction in std::mem::take(&mut state.unverified_contradictions) {
            let priority = if contradiction.is_load_bearing(&state.graph) {
                Priority::P0
            } else {
                Priority::P2
            };
            let objective = format!(
                "Verify conflicting answers to \"{}\": {}",
                contradiction.question,
                contradiction.answers.join(" vs ")
            );
            if has_live_objective(&state.graph, &objective) {
                continue;
            }
            let id = state
                .graph
                .insert(Task::new(&objective, priority).with_dimension("verification"), &[])?;
            info!(task = %id.short(), %priority, "Verification task added");
            changed = true;
        }

        for id in std::mem::take(&mut state.thin_tasks) {
            let Some(task) = state.graph.get_task(&id).cloned() else {
                continue;
            };
            if !needs_corroboration(&state.graph, &task) {
                continue;
            }
            let follow_up = state.graph.insert(Task::corroborating(&task), &[])?;
            info!(task = %id.short(), corroboration = %follow_up.short(), "Thin evidence; corroboration added");
            changed = true;
        }

        if inherit_priorities(&mut state.graph)? {
            changed = true;
        }
        if changed {
            self.recheck_plan(state);
        }

        if self.config.early_completion_check
            && !state.evidence.is_empty()
            && state.graph.has_schedulable_work()
            && load_bearing_done(&state.graph)
            && state.early_check_at != Some(state.evidence.watermark())
        {
            state.early_check_at = Some(state.evidence.watermark());
            debug!("Load-bearing tasks complete; consulting judge early");
            return Ok(Decision::EarlyCheck);
        }

        let batch: Vec<TaskId> = state
            .graph
            .ready_set()
            .iter()
            .take(self.config.max_batch_tasks)
            .map(|t| t.id)
            .collect();
        if batch.is_empty() {
            let stranded = state.graph.unsatisfiable();
            if !stranded.is_empty() {
                info!(count = stranded.len(), "Tasks unreachable after upstream failures");
            }
            return Ok(Decision::Exhausted);
        }
        Ok(Decision::Act(batch))
    }

    fn recheck_plan(&self, state: &mut OrchestrationState) {
        let verdict = self.plan_validator.check_structure(state.query(), &state.graph);
        if !verdict.accepted {
            warn!(issues = verdict.issues.len(), "Changed plan fails structural checks");
        }
        state.plan_verdict = Some(verdict);
    }

    async fn act(&self, state: &mut OrchestrationState, batch: Vec<TaskId>) -> Result<()> {
        let mut tasks = Vec::with_capacity(batch.len());
        for id in &batch {
            if state.graph.get_task(id).map(|t| t.status) == Some(TaskStatus::Pending) {
                state.graph.mark(id, TaskStatus::Ready, &[])?;
            }
            state.graph.mark(id, TaskStatus::InProgress, &[])?;
            if let Some(task) = state.graph.get_task(id) {
                tasks.push(task.clone());
            }
        }

        let proposals = try_join_all(tasks.iter().map(|t| self.capability.propose_operations(t))).await?;
        let mut operations = Vec::new();
        for (task, proposed) in tasks.iter().zip(proposals) {
            for operation in proposed {
                if operation.task_id == task.id {
                    operations.push(operation);
                } else {
                    warn!(task = %task.id.short(), operation = %operation.id.short(), "Dropping operation proposed for another task");
                }
            }
        }

        let mut folds: HashMap<TaskId, TaskFold> = HashMap::new();
        let mut dispatched = operations.len();
        let results = self.dispatcher.dispatch_batch(operations).await;
        absorb(state, results, &mut folds)?;

        if self.cancel.is_cancelled() {
            warn!("Cancelled; skipping evidence gathering");
        } else {
            let follow_ups = self.follow_ups(state, &tasks, &folds).await?;
            if !follow_ups.is_empty() {
                dispatched += follow_ups.len();
                let results = self.dispatcher.dispatch_batch(follow_ups).await;
                absorb(state, results, &mut folds)?;
            }
        }

        for task in &tasks {
            let fold = folds.remove(&task.id).unwrap_or_default();
            let summary = fold.error_summary();
            match state.settle_task(&task.id, &fold.evidence, &summary)? {
                Some(MarkOutcome::Applied) if fold.evidence.is_empty() => {
                    info!(task = %task.id.short(), error = %summary, "Task blocked");
                }
                Some(_) => {
                    debug!(task = %task.id.short(), records = fold.evidence.len(), "Task settled");
                }
                None => {}
            }
        }

        state.iteration += 1;
        state.last_operations = dispatched;
        info!(
            iteration = state.iteration,
            tasks = tasks.len(),
            operations = dispatched,
            records = state.evidence.len(),
            "Act phase complete"
        );
        Ok(())
    }

    /// Evidence-gathering operations for locators found by discovery.
    async fn follow_ups(
        &self,
        state: &OrchestrationState,
        tasks: &[Task],
        folds: &HashMap<TaskId, TaskFold>,
    ) -> Result<Vec<Operation>> {
        let candidates: Vec<(&Task, &TaskFold)> = tasks
            .iter()
            .filter_map(|t| folds.get(&t.id).map(|f| (t, f)))
            .filter(|(_, fold)| !fold.discovered.is_empty())
            .collect();

        let selections = try_join_all(
            candidates
                .iter()
                .map(|(task, fold)| self.capability.select_locators(task, &fold.discovered)),
        )
        .await?;

        let mut operations = Vec::new();
        for ((task, fold), chosen) in candidates.iter().zip(selections) {
            let fetched: HashSet<&Locator> = state
                .evidence
                .query(&task.id)
                .map(|r| &r.locator)
                .chain(fold.fetched.iter())
                .collect();

            let mut picked: Vec<Locator> = Vec::new();
            for locator in chosen {
                if picked.len() >= self.config.max_locators_per_task {
                    break;
                }
                if !fold.discovered.contains(&locator) {
                    debug!(task = %task.id.short(), %locator, "Ignoring locator that was not discovered");
                    continue;
                }
                if fetched.contains(&locator) || picked.contains(&locator) {
                    continue;
                }
                picked.push(locator);
            }
            operations.extend(picked.into_iter().map(|l| Operation::gather(task.id, l)));
        }
        Ok(operations)
    }

    async fn converge(&self, state: &mut OrchestrationState, stop: Stop) -> Result<Option<Convergence>> {
        let verdict = self
            .judge
            .judge(state.query(), &state.graph, &state.evidence)
            .await?;
        state.completion_verdict = Some(verdict.clone());

        if verdict.accepted {
            let mode = match stop {
                Stop::Budget(reason) => {
                    state.caveats.push(format!("Research stopped early: {reason}"));
                    ConvergenceMode::Forced { reason }
                }
                Stop::Exhausted | Stop::Early => ConvergenceMode::Natural,
            };
            info!(session = %state.id().short(), ?mode, "Completion judge accepted");
            return Ok(Some(Convergence {
                mode,
                caveats: state.caveats.clone(),
            }));
        }

        match stop {
            Stop::Early => {
                debug!(issues = verdict.issues.len(), "Early completion check rejected");
                state.transition(SessionPhase::Deciding)?;
                Ok(None)
            }
            Stop::Budget(reason) => Ok(Some(force(state, reason, &verdict))),
            Stop::Exhausted => {
                state.judge_rejections += 1;
                if state.judge_rejections > self.config.max_judge_rejections {
                    return Ok(Some(force(state, ForcedReason::JudgeRejectLimit, &verdict)));
                }
                let created = apply_issues(&mut state.graph, &verdict)?;
                if created > 0 {
                    self.recheck_plan(state);
                }
                info!(
                    rejections = state.judge_rejections,
                    issues = verdict.issues.len(),
                    created,
                    "Completion judge rejected; continuing research"
                );
                state.transition(SessionPhase::Deciding)?;
                Ok(None)
            }
        }
    }
}

fn absorb(
    state: &mut OrchestrationState,
    results: Vec<OperationResult>,
    folds: &mut HashMap<TaskId, TaskFold>,
) -> Result<()> {
    for result in results {
        let fold = folds.entry(result.operation.task_id).or_default();
        match result.outcome {
            Ok(OperationOutput::Discovered { candidates }) => {
                for candidate in candidates {
                    if !fold.discovered.contains(&candidate) {
                        fold.discovered.push(candidate);
                    }
                }
            }
            Ok(OperationOutput::Gathered(draft)) => {
                fold.fetched.insert(draft.locator().clone());
                if let Some(id) = state.record_evidence(draft)? {
                    fold.evidence.push(id);
                }
            }
            Err(err) => {
                if let OperationKind::EvidenceGathering { locator } = &result.operation.kind {
                    fold.fetched.insert(locator.clone());
                }
                fold.errors.push(err.to_string());
            }
        }
    }
    Ok(())
}

fn force(state: &mut OrchestrationState, reason: ForcedReason, verdict: &ValidationVerdict) -> Convergence {
    warn!(session = %state.id().short(), %reason, issues = verdict.issues.len(), "Forcing convergence");
    state.caveats.push(format!("Research stopped early: {reason}"));
    if !verdict.accepted {
        state
            .caveats
            .push(format!("Completion judge not satisfied: {}", issue_summary(verdict)));
    }
    Convergence {
        mode: ConvergenceMode::Forced { reason },
        caveats: state.caveats.clone(),
    }
}

fn issue_summary(verdict: &ValidationVerdict) -> String {
    verdict
        .issues
        .iter()
        .map(|i| format!("{}: {}", i.dimension, i.missing_detail))
        .collect::<Vec<_>>()
        .join("; ")
}

fn has_live_objective(graph: &TaskGraph, objective: &str) -> bool {
    let objective = objective.trim();
    graph
        .tasks()
        .iter()
        .any(|t| t.status != TaskStatus::Failed && t.objective.trim().eq_ignore_ascii_case(objective))
}

/// A load-bearing task with thin evidence gets one corroboration, ever.
fn needs_corroboration(graph: &TaskGraph, task: &Task) -> bool {
    task.priority.is_load_bearing()
        && task.corroborates.is_none()
        && task.superseded_by.is_none()
        && !graph.tasks().iter().any(|t| t.corroborates == Some(task.id))
}

/// Every P0/P1 task is completed, and there is at least one.
fn load_bearing_done(graph: &TaskGraph) -> bool {
    let mut load_bearing = graph
        .tasks()
        .into_iter()
        .filter(|t| t.priority.is_load_bearing() && t.superseded_by.is_none())
        .peekable();
    load_bearing.peek().is_some() && load_bearing.all(|t| t.status == TaskStatus::Completed)
}

/// Raise pending dependencies to the priority of the tasks waiting on them.
///
/// Walks dependents before dependencies so raises propagate transitively.
fn inherit_priorities(graph: &mut TaskGraph) -> Result<bool> {
    let order: Vec<TaskId> = graph.topological_order()?.iter().rev().map(|t| t.id).collect();
    let mut changed = false;
    for id in order {
        let Some(task) = graph.get_task(&id) else {
            continue;
        };
        if !task.can_start() {
            continue;
        }
        let priority = task.priority;
        let raise: Vec<TaskId> = graph
            .get_dependencies(&id)
            .iter()
            .filter(|d| d.can_start() && d.priority > priority)
            .map(|d| d.id)
            .collect();
        for dependency in raise {
            graph.update_priority(&dependency, priority)?;
            changed = true;
        }
    }
    Ok(changed)
}

/// Turn completion-gate issues into work. Returns the number of tasks added.
///
/// Blocked tasks are re-queued, failed ones superseded, thin completed ones
/// corroborated. Issues without a task become new P1 tasks.
fn apply_issues(graph: &mut TaskGraph, verdict: &ValidationVerdict) -> Result<usize> {
    let mut created = 0;
    for issue in &verdict.issues {
        let target = issue.task_id.and_then(|id| graph.get_task(&id).cloned());
        match target {
            Some(task) => match task.status {
                TaskStatus::Blocked => {
                    graph.mark(&task.id, TaskStatus::Ready, &[])?;
                }
                TaskStatus::Failed => {
                    if reopen(graph, &task)? {
                        created += 1;
                    }
                }
                TaskStatus::Completed => {
                    let follow_up = Task::corroborating(&task);
                    if !has_live_objective(graph, &follow_up.objective) {
                        graph.insert(follow_up, &[])?;
                        created += 1;
                    }
                }
                TaskStatus::Pending | TaskStatus::Ready => {
                    for ancestor in failed_ancestors(graph, &task.id) {
                        if reopen(graph, &ancestor)? {
                            created += 1;
                        }
                    }
                }
                TaskStatus::InProgress => {}
            },
            None => {
                if has_live_objective(graph, &issue.missing_detail) {
                    continue;
                }
                let task = Task::new(&issue.missing_detail, Priority::P1).with_dimension(&issue.dimension);
                graph.insert(task, &[])?;
                created += 1;
            }
        }
    }
    Ok(created)
}

/// Supersede a failed task with a fresh copy unless one is already live.
fn reopen(graph: &mut TaskGraph, failed: &Task) -> Result<bool> {
    if failed.superseded_by.is_some() || has_live_objective(graph, &failed.objective) {
        return Ok(false);
    }
    let mut replacement = Task::new(&failed.objective, failed.priority);
    replacement.dimension = failed.dimension.clone();
    replacement.corroborates = failed.corroborates;
    let id = graph.supersede(&failed.id, replacement)?;
    info!(failed = %failed.id.short(), replacement = %id.short(), "Failed task superseded");
    Ok(true)
}

fn failed_ancestors(graph: &TaskGraph, id: &TaskId) -> Vec<Task> {
    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut stack = vec![*id];
    let mut failed = Vec::new();
    while let Some(current) = stack.pop() {
        for dependency in graph.get_dependencies(&current) {
            if !seen.insert(dependency.id) {
                continue;
            }
            if dependency.status == TaskStatus::Failed {
                failed.push(dependency.clone());
            } else {
                stack.push(dependency.id);
            }
        }
    }
    failed
}
