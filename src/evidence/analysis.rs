//! Contradiction detection and sufficiency assessment over the store.

use super::record::{EvidenceId, ReliabilityTier};
use super::store::{EvidenceStore, ReliabilitySummary};
use crate::core::dag::TaskGraph;
use crate::core::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Records that answer the same question differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Normalized question the records disagree on.
    pub question: String,
    /// Distinct normalized answers, in order of first appearance.
    pub answers: Vec<String>,
    pub evidence: Vec<EvidenceId>,
    pub tasks: Vec<TaskId>,
    /// Settled by agreeing `verified_primary` sources.
    pub resolved: bool,
}

impl Contradiction {
    /// Whether any involved task is P0 or P1.
    pub fn is_load_bearing(&self, graph: &TaskGraph) -> bool {
        self.tasks.iter().any(|id| {
            graph
                .get_task(id)
                .map(|task| task.priority.is_load_bearing())
                .unwrap_or(false)
        })
    }

    pub fn touches(&self, task_id: &TaskId) -> bool {
        self.tasks.contains(task_id)
    }
}

#[derive(Default)]
struct ClaimGroup {
    answers: Vec<String>,
    evidence: Vec<EvidenceId>,
    tasks: Vec<TaskId>,
    primary_answers: HashSet<String>,
}

/// Find every question that current (non-superseded) records answer in
/// more than one way.
///
/// A contradiction is resolved when at least one `verified_primary` record
/// answers the question and all such records agree.
pub fn detect_contradictions(store: &EvidenceStore) -> Vec<Contradiction> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, ClaimGroup> = HashMap::new();

    for record in store.iter().filter(|r| !store.is_superseded(r.id)) {
        for claim in &record.claims {
            let question = claim.normalized_question();
            let answer = claim.normalized_answer();
            if question.is_empty() {
                continue;
            }
            let group = groups.entry(question.clone()).or_insert_with(|| {
                order.push(question.clone());
                ClaimGroup::default()
            });
            if !group.answers.contains(&answer) {
                group.answers.push(answer.clone());
            }
            if !group.evidence.contains(&record.id) {
                group.evidence.push(record.id);
            }
            if !group.tasks.contains(&record.task_id) {
                group.tasks.push(record.task_id);
            }
            if record.reliability == ReliabilityTier::VerifiedPrimary {
                group.primary_answers.insert(answer);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|question| {
            let group = groups.remove(&question)?;
            if group.answers.len() < 2 {
                return None;
            }
            Some(Contradiction {
                question,
                resolved: group.primary_answers.len() == 1,
                answers: group.answers,
                evidence: group.evidence,
                tasks: group.tasks,
            })
        })
        .collect()
}

/// Whether a task's evidence is enough to stand on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sufficiency {
    Sufficient,
    Thin,
}

/// Evidence profile of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvidence {
    pub records: usize,
    pub distinct_sources: usize,
    pub best_tier: Option<ReliabilityTier>,
    pub sufficiency: Sufficiency,
}

/// Profile a task's current records.
///
/// Sufficient means at least `min_sources` distinct locators and at least
/// one record at `secondary` or better.
pub fn assess_sufficiency(store: &EvidenceStore, task_id: &TaskId, min_sources: usize) -> TaskEvidence {
    let records = store.latest_for_task(task_id);
    let distinct_sources = records
        .iter()
        .map(|r| &r.locator)
        .collect::<HashSet<_>>()
        .len();
    let best_tier = records.iter().map(|r| r.reliability).min();
    let sufficiency = if distinct_sources >= min_sources && best_tier.is_some_and(|t| t.is_high()) {
        Sufficiency::Sufficient
    } else {
        Sufficiency::Thin
    };

    TaskEvidence {
        records: records.len(),
        distinct_sources,
        best_tier,
        sufficiency,
    }
}

/// Everything the completion gate needs to know about the store.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSummary {
    pub tasks: HashMap<TaskId, TaskEvidence>,
    pub contradictions: Vec<Contradiction>,
    pub reliability: ReliabilitySummary,
    pub total_records: usize,
}

impl EvidenceSummary {
    pub fn build(graph: &TaskGraph, store: &EvidenceStore, min_sources: usize) -> Self {
        let tasks = graph
            .tasks()
            .into_iter()
            .map(|task| (task.id, assess_sufficiency(store, &task.id, min_sources)))
            .collect();

        Self {
            tasks,
            contradictions: detect_contradictions(store),
            reliability: store.reliability_summary(),
            total_records: store.len(),
        }
    }

    pub fn for_task(&self, id: &TaskId) -> Option<&TaskEvidence> {
        self.tasks.get(id)
    }

    /// Unresolved contradictions that involve a P0 or P1 task.
    pub fn unresolved_load_bearing<'a>(
        &'a self,
        graph: &'a TaskGraph,
    ) -> impl Iterator<Item = &'a Contradiction> + 'a {
        self.contradictions
            .iter()
            .filter(move |c| !c.resolved && c.is_load_bearing(graph))
    }
}
