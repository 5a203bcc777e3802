//! Task graph for dependency-aware research planning.
//!
//! This module provides the TaskGraph structure that represents the research
//! plan as a directed acyclic graph. Edges point from a dependency to the task
//! that waits on it. Node insertion order is preserved by petgraph and serves
//! as the deterministic tie-break when ordering ready work.

use crate::core::task::{Priority, Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::evidence::EvidenceId;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Default number of dispatches a task gets before it is forced to `failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What a call to [`TaskGraph::mark`] actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The requested transition was applied.
    Applied,
    /// The task already had this status and evidence; nothing changed.
    Unchanged,
    /// A re-queue was requested but the task had used up its attempts,
    /// so it was failed instead.
    ForcedFailed,
}

/// The research plan.
///
/// TaskGraph uses petgraph's DiGraph. Nodes are tasks; an edge `a -> b`
/// means `a` must complete before `b` can become ready.
#[derive(Clone)]
pub struct TaskGraph {
    /// The underlying directed graph.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
    /// Attempt bound applied when re-queueing blocked tasks.
    max_attempts: u32,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the attempt bound for blocked-task re-queues.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub(crate) fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    /// The attempt bound for blocked-task re-queues.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Insert a task that depends on the given tasks.
    ///
    /// The task always enters the graph as `pending` with no evidence and no
    /// attempts, whatever the caller set.
    ///
    /// # Errors
    /// - `DuplicateTask` if the id is already present
    /// - `Cycle` if the task lists itself as a dependency
    /// - `UnknownDependency` if a dependency is not in the graph
    ///
    /// On error the graph is unchanged.
    pub fn insert(&mut self, mut task: Task, depends_on: &[TaskId]) -> Result<TaskId> {
        if self.task_index.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id));
        }

        let mut dependencies: Vec<TaskId> = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            if *dep == task.id {
                return Err(Error::Cycle {
                    from: *dep,
                    to: task.id,
                });
            }
            if !self.task_index.contains_key(dep) {
                return Err(Error::UnknownDependency { dependency: *dep });
            }
            if !dependencies.contains(dep) {
                dependencies.push(*dep);
            }
        }

        task.status = TaskStatus::Pending;
        task.dependencies = dependencies.clone();
        task.evidence.clear();
        task.attempts = 0;
        task.superseded_by = None;

        let id = task.id;
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        for dep in &dependencies {
            let dep_index = self.task_index[dep];
            self.graph.add_edge(dep_index, index, ());
        }

        debug!(task = %id.short(), deps = dependencies.len(), "Task inserted");
        Ok(id)
    }

    /// Add a dependency edge to an existing task.
    ///
    /// `dependency` must complete before `dependent` can start. Adding an
    /// edge that already exists is a no-op.
    ///
    /// # Errors
    /// - `UnknownDependency` / `TaskNotFound` for absent tasks
    /// - `ImmutableState` if `dependent` has already started
    /// - `Cycle` if the edge would close a cycle (graph unchanged)
    pub fn add_dependency(&mut self, dependency: &TaskId, dependent: &TaskId) -> Result<()> {
        let dep_index = *self
            .task_index
            .get(dependency)
            .ok_or(Error::UnknownDependency {
                dependency: *dependency,
            })?;
        let dependent_index = *self
            .task_index
            .get(dependent)
            .ok_or(Error::TaskNotFound(*dependent))?;

        let status = self.graph[dependent_index].status;
        if status.has_started() {
            return Err(Error::ImmutableState {
                id: *dependent,
                status,
            });
        }

        if self.graph.find_edge(dep_index, dependent_index).is_some() {
            return Ok(());
        }

        // A path dependent -> dependency means the new edge closes a cycle.
        if dep_index == dependent_index
            || has_path_connecting(&self.graph, dependent_index, dep_index, None)
        {
            return Err(Error::Cycle {
                from: *dependency,
                to: *dependent,
            });
        }

        self.graph.add_edge(dep_index, dependent_index, ());
        let dependency_done = self.graph[dep_index].status == TaskStatus::Completed;
        let task = &mut self.graph[dependent_index];
        task.dependencies.push(*dependency);
        if task.status == TaskStatus::Ready && !dependency_done {
            task.status = TaskStatus::Pending;
        }
        Ok(())
    }

    /// Replace a failed task with a fresh one.
    ///
    /// The replacement inherits the failed task's dependencies, and every
    /// dependent that has not started is rewired to wait on the replacement.
    pub fn supersede(&mut self, failed: &TaskId, replacement: Task) -> Result<TaskId> {
        let failed_index = *self
            .task_index
            .get(failed)
            .ok_or(Error::TaskNotFound(*failed))?;
        let status = self.graph[failed_index].status;
        if status != TaskStatus::Failed {
            return Err(Error::InvalidTransition {
                id: *failed,
                from: status,
                to: TaskStatus::Failed,
            });
        }

        let inherited = self.graph[failed_index].dependencies.clone();
        let replacement_id = self.insert(replacement, &inherited)?;
        let replacement_index = self.task_index[&replacement_id];
        self.graph[failed_index].superseded_by = Some(replacement_id);

        let dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(failed_index, Direction::Outgoing)
            .filter(|index| !self.graph[*index].status.has_started())
            .collect();

        for dependent in dependents {
            if let Some(edge) = self.graph.find_edge(failed_index, dependent) {
                self.graph.remove_edge(edge);
            }
            if self.graph.find_edge(replacement_index, dependent).is_none() {
                self.graph.add_edge(replacement_index, dependent, ());
            }
            let task = &mut self.graph[dependent];
            for dep in task.dependencies.iter_mut() {
                if dep == failed {
                    *dep = replacement_id;
                }
            }
            let mut seen = HashSet::new();
            task.dependencies.retain(|dep| seen.insert(*dep));
        }

        info!(
            failed = %failed.short(),
            replacement = %replacement_id.short(),
            "Failed task superseded"
        );
        Ok(replacement_id)
    }

    /// Change a task's priority. Returns the previous priority.
    ///
    /// # Errors
    /// `ImmutableState` if the task is completed or failed.
    pub fn update_priority(&mut self, id: &TaskId, priority: Priority) -> Result<Priority> {
        let task = self.get_task_mut(id).ok_or(Error::TaskNotFound(*id))?;
        if task.status.is_terminal() {
            return Err(Error::ImmutableState {
                id: *id,
                status: task.status,
            });
        }
        let previous = task.priority;
        if previous != priority {
            task.priority = priority;
            info!(task = %id.short(), from = %previous, to = %priority, "Task priority updated");
        }
        Ok(previous)
    }

    /// Tasks that can be dispatched now.
    ///
    /// A task qualifies when it is `pending` or `ready` and every dependency
    /// is `completed`. Ordered by priority (P0 first), then insertion order.
    pub fn ready_set(&self) -> Vec<&Task> {
        let mut ready: Vec<(NodeIndex, &Task)> = self
            .graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;
                if task.can_start() && self.dependencies_satisfied(index) {
                    Some((index, task))
                } else {
                    None
                }
            })
            .collect();

        ready.sort_by_key(|(index, task)| (task.priority, index.index()));
        ready.into_iter().map(|(_, task)| task).collect()
    }

    /// Transition a task and attach evidence ids.
    ///
    /// Re-marking a task with its current status and already-attached
    /// evidence is a no-op. See [`TaskStatus::can_transition_to`] for the
    /// transition table. Re-queueing (`blocked -> ready`) a task that has
    /// used its attempts fails it instead.
    ///
    /// # Errors
    /// - `TaskNotFound`
    /// - `ImmutableState` for any change to a terminal task
    /// - `InvalidTransition` for edges outside the table
    /// - `DependenciesUnmet` for `pending -> ready` too early
    pub fn mark(
        &mut self,
        id: &TaskId,
        status: TaskStatus,
        evidence: &[EvidenceId],
    ) -> Result<MarkOutcome> {
        let index = *self.task_index.get(id).ok_or(Error::TaskNotFound(*id))?;
        let current = self.graph[index].status;

        if current == status {
            let task = &self.graph[index];
            if evidence.iter().all(|e| task.evidence.contains(e)) {
                return Ok(MarkOutcome::Unchanged);
            }
            if current.is_terminal() {
                return Err(Error::ImmutableState {
                    id: *id,
                    status: current,
                });
            }
            let task = &mut self.graph[index];
            attach_evidence(task, evidence);
            return Ok(MarkOutcome::Applied);
        }

        if current.is_terminal() {
            return Err(Error::ImmutableState {
                id: *id,
                status: current,
            });
        }
        if !current.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                id: *id,
                from: current,
                to: status,
            });
        }
        if current == TaskStatus::Pending && !self.dependencies_satisfied(index) {
            return Err(Error::DependenciesUnmet(*id));
        }

        let max_attempts = self.max_attempts;
        let task = &mut self.graph[index];
        attach_evidence(task, evidence);

        match status {
            TaskStatus::Ready if current == TaskStatus::Blocked && task.attempts >= max_attempts => {
                let reason = format!(
                    "exceeded {} attempts: {}",
                    max_attempts,
                    task.last_error.as_deref().unwrap_or("no evidence gathered")
                );
                task.fail(&reason);
                warn!(task = %id.short(), attempts = task.attempts, "Task failed after exhausting attempts");
                return Ok(MarkOutcome::ForcedFailed);
            }
            TaskStatus::Ready => task.mark_ready(),
            TaskStatus::InProgress => task.start(),
            TaskStatus::Completed => task.complete(),
            TaskStatus::Failed => {
                let reason = task.last_error.clone().unwrap_or_else(|| "failed".to_string());
                task.fail(&reason);
            }
            TaskStatus::Blocked => {
                let reason = task.last_error.clone().unwrap_or_else(|| "blocked".to_string());
                task.block(&reason);
            }
            // Nothing transitions back to pending through the table.
            TaskStatus::Pending => {}
        }

        debug!(task = %id.short(), from = %current, to = %status, "Task status changed");
        Ok(MarkOutcome::Applied)
    }

    /// Record why a dispatch failed and mark the task `blocked`.
    pub fn mark_blocked(&mut self, id: &TaskId, reason: &str) -> Result<MarkOutcome> {
        if let Some(task) = self.get_task_mut(id) {
            if task.status == TaskStatus::InProgress {
                task.last_error = Some(reason.to_string());
            }
        }
        self.mark(id, TaskStatus::Blocked, &[])
    }

    /// Move every pending task whose dependencies are complete to `ready`.
    ///
    /// Returns the promoted ids in insertion order.
    pub fn promote_ready(&mut self) -> Vec<TaskId> {
        let promotable: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| {
                self.graph[*index].status == TaskStatus::Pending
                    && self.dependencies_satisfied(*index)
            })
            .collect();

        promotable
            .into_iter()
            .map(|index| {
                let task = &mut self.graph[index];
                task.mark_ready();
                task.id
            })
            .collect()
    }

    /// Not-yet-started tasks that can never run because an ancestor failed.
    pub fn unsatisfiable(&self) -> Vec<TaskId> {
        let order = match toposort(&self.graph, None) {
            Ok(order) => order,
            Err(_) => return Vec::new(),
        };

        let mut doomed: HashSet<NodeIndex> = HashSet::new();
        for index in order {
            let poisoned = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .any(|dep| self.graph[dep].status == TaskStatus::Failed || doomed.contains(&dep));
            if poisoned && !self.graph[index].status.is_terminal() {
                doomed.insert(index);
            }
        }

        self.graph
            .node_indices()
            .filter(|index| doomed.contains(index) && self.graph[*index].can_start())
            .map(|index| self.graph[index].id)
            .collect()
    }

    /// Whether any task can still make progress.
    ///
    /// True while a task is in flight, blocked (re-queueable or about to be
    /// failed by the attempt bound), or not started with satisfiable
    /// dependencies.
    pub fn has_schedulable_work(&self) -> bool {
        let doomed: HashSet<TaskId> = self.unsatisfiable().into_iter().collect();
        self.graph.node_weights().any(|task| match task.status {
            TaskStatus::InProgress | TaskStatus::Blocked => true,
            TaskStatus::Pending | TaskStatus::Ready => !doomed.contains(&task.id),
            TaskStatus::Completed | TaskStatus::Failed => false,
        })
    }

    fn dependencies_satisfied(&self, index: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .all(|dep| self.graph[dep].status == TaskStatus::Completed)
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub(crate) fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph.node_weight_mut(index)
        } else {
            None
        }
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if `dependent` waits on `dependency`.
    pub fn has_dependency(&self, dependency: &TaskId, dependent: &TaskId) -> bool {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.task_index.get(dependency), self.task_index.get(dependent))
        {
            self.graph.find_edge(from_idx, to_idx).is_some()
        } else {
            false
        }
    }

    /// Get all tasks that the given task depends on.
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph
                .neighbors_directed(index, Direction::Incoming)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// Get all tasks that depend on the given task.
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph
                .neighbors_directed(index, Direction::Outgoing)
                .filter_map(|neighbor| self.graph.node_weight(neighbor))
                .collect()
        } else {
            Vec::new()
        }
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Number of tasks currently in `status`.
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.graph
            .node_weights()
            .filter(|task| task.status == status)
            .count()
    }

    /// Task count per status. Statuses with no tasks are absent.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.graph.node_weights() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Get tasks in topological order (each after all of its dependencies).
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let id = self.graph[cycle.node_id()].id;
            Error::Cycle { from: id, to: id }
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }
}

fn attach_evidence(task: &mut Task, evidence: &[EvidenceId]) {
    for id in evidence {
        if !task.evidence.contains(id) {
            task.evidence.push(*id);
        }
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
