//! Plan gate.
//!
//! Runs whenever the task graph is created or changed. The deterministic
//! tier checks size, dimension spread, priority, and constraint coverage.
//! The optional semantic tier asks the reasoning capability and can only add
//! rejections.

use super::verdict::{parse_gate_response, GateKind, ValidationVerdict, VerdictIssue};
use crate::core::dag::TaskGraph;
use crate::core::task::{Priority, TaskStatus};
use crate::error::Result;
use crate::orchestration::capability::{ComplexityTier, JudgeRequest, ReasoningCapability, ResearchQuery};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const STOPWORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "before", "between", "but", "can",
    "each", "for", "from", "has", "have", "how", "include", "including", "into", "its", "more",
    "most", "must", "not", "only", "other", "our", "over", "per", "should", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "use",
    "using", "very", "via", "was", "were", "what", "when", "where", "which", "who", "why",
    "will", "with", "within", "without", "you", "your",
];

/// Minimum plan shape for one complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierMinimums {
    pub tasks: usize,
    pub dimensions: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanValidatorConfig {
    pub simple: TierMinimums,
    pub moderate: TierMinimums,
    pub complex: TierMinimums,
    /// Ask the reasoning capability for a coverage review.
    pub semantic_review: bool,
}

impl Default for PlanValidatorConfig {
    fn default() -> Self {
        Self {
            simple: TierMinimums { tasks: 1, dimensions: 1 },
            moderate: TierMinimums { tasks: 3, dimensions: 2 },
            complex: TierMinimums { tasks: 5, dimensions: 3 },
            semantic_review: false,
        }
    }
}

impl PlanValidatorConfig {
    pub fn minimums(&self, tier: ComplexityTier) -> TierMinimums {
        match tier {
            ComplexityTier::Simple => self.simple,
            ComplexityTier::Moderate => self.moderate,
            ComplexityTier::Complex => self.complex,
        }
    }
}

/// Lowercase alphanumeric words of 3+ characters, stopwords removed.
pub fn constraint_keywords(constraint: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for word in words(constraint) {
        if word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()) && !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Whether an objective mentions at least half (rounded up) of the keywords.
pub fn covers(objective: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let present: HashSet<String> = words(objective).collect();
    let hits = keywords.iter().filter(|k| present.contains(*k)).count();
    hits >= keywords.len().div_ceil(2)
}

pub struct PlanValidator {
    config: PlanValidatorConfig,
    capability: Option<Arc<dyn ReasoningCapability>>,
}

impl PlanValidator {
    pub fn new(config: PlanValidatorConfig) -> Self {
        Self {
            config,
            capability: None,
        }
    }

    /// Attach the capability used by the semantic tier.
    pub fn with_capability(mut self, capability: Arc<dyn ReasoningCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn config(&self) -> &PlanValidatorConfig {
        &self.config
    }

    /// Deterministic checks only. Failed tasks are not counted.
    pub fn check_structure(&self, query: &ResearchQuery, graph: &TaskGraph) -> ValidationVerdict {
        let minimums = self.config.minimums(query.complexity);
        let tasks: Vec<_> = graph
            .tasks()
            .into_iter()
            .filter(|t| t.status != TaskStatus::Failed)
            .collect();
        let mut issues = Vec::new();

        if tasks.len() < minimums.tasks {
            issues.push(VerdictIssue::new(
                "scope",
                &format!(
                    "plan has {} task(s); a {} query needs at least {}",
                    tasks.len(),
                    query.complexity,
                    minimums.tasks
                ),
            ));
        }

        let dimensions: HashSet<String> = tasks
            .iter()
            .filter_map(|t| t.dimension.as_deref())
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        if dimensions.len() < minimums.dimensions {
            issues.push(VerdictIssue::new(
                "dimensions",
                &format!(
                    "plan covers {} research dimension(s); a {} query needs at least {}",
                    dimensions.len(),
                    query.complexity,
                    minimums.dimensions
                ),
            ));
        }

        if !tasks.iter().any(|t| t.priority == Priority::P0) {
            issues.push(VerdictIssue::new("priority", "no P0 task"));
        }

        for constraint in &query.constraints {
            let keywords = constraint_keywords(constraint);
            if !tasks.iter().any(|t| covers(&t.objective, &keywords)) {
                issues.push(VerdictIssue::new(
                    constraint,
                    "no task objective covers this constraint",
                ));
            }
        }

        debug!(tasks = tasks.len(), dimensions = dimensions.len(), issues = issues.len(), "Plan structure checked");
        ValidationVerdict::from_issues(GateKind::Plan, issues)
    }

    /// Full gate: deterministic tier, then the semantic tier if enabled and
    /// the plan passed the first tier.
    pub async fn validate(&self, query: &ResearchQuery, graph: &TaskGraph) -> Result<ValidationVerdict> {
        let verdict = self.check_structure(query, graph);
        if !verdict.accepted || !self.config.semantic_review {
            return Ok(verdict);
        }
        let Some(capability) = &self.capability else {
            return Ok(verdict);
        };

        let request = JudgeRequest {
            gate: GateKind::Plan,
            query: query.clone(),
            digest: plan_digest(graph),
        };
        let response = capability.judge_inputs(&request).await?;
        let semantic = parse_gate_response(&response, GateKind::Plan)?.into_verdict(GateKind::Plan);
        info!(accepted = semantic.accepted, issues = semantic.issues.len(), "Semantic plan review");
        Ok(verdict.merge(semantic))
    }
}

/// One line per task: priority, dimension, objective.
pub fn plan_digest(graph: &TaskGraph) -> String {
    graph
        .tasks()
        .iter()
        .map(|t| {
            format!(
                "- [{}] ({}) {}",
                t.priority,
                t.dimension.as_deref().unwrap_or("general"),
                t.objective
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
