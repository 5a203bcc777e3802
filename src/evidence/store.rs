//! Append-only evidence store.
//!
//! Records get strictly increasing ids starting at 1. Nothing is ever
//! overwritten: a correction is a new record that points at the one it
//! corrects, and both stay resolvable.

use super::citation::{CitationSpan, CitationToken};
use super::record::{EvidenceDraft, EvidenceId, EvidenceRecord, ReliabilityTier};
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Record counts per reliability tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilitySummary {
    pub verified_primary: usize,
    pub secondary: usize,
    pub unverified: usize,
}

impl ReliabilitySummary {
    pub fn total(&self) -> usize {
        self.verified_primary + self.secondary + self.unverified
    }

    fn count(&mut self, tier: ReliabilityTier) {
        match tier {
            ReliabilityTier::VerifiedPrimary => self.verified_primary += 1,
            ReliabilityTier::Secondary => self.secondary += 1,
            ReliabilityTier::Unverified => self.unverified += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    /// Record with id `n` lives at index `n - 1`.
    records: Vec<EvidenceRecord>,
    by_task: HashMap<TaskId, Vec<usize>>,
    superseded: HashSet<EvidenceId>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a draft and return its id.
    ///
    /// # Errors
    /// `EvidenceNotFound` if the draft corrects a record that does not exist.
    pub fn append(&mut self, draft: EvidenceDraft) -> Result<EvidenceId> {
        if let Some(target) = draft.supersedes() {
            if self.get(target).is_none() {
                return Err(Error::EvidenceNotFound(target));
            }
        }

        let id = EvidenceId(self.records.len() as u64 + 1);
        let record = draft.into_record(id);
        if let Some(target) = record.supersedes {
            self.superseded.insert(target);
        }

        debug!(
            evidence = %id,
            task = %record.task_id.short(),
            tier = %record.reliability,
            locator = %record.locator,
            "Evidence appended"
        );

        self.by_task
            .entry(record.task_id)
            .or_default()
            .push(self.records.len());
        self.records.push(record);
        Ok(id)
    }

    /// Records produced by a task, oldest first.
    ///
    /// The iterator borrows the store; call again to restart.
    pub fn query(&self, task_id: &TaskId) -> impl Iterator<Item = &EvidenceRecord> + '_ {
        self.by_task
            .get(task_id)
            .into_iter()
            .flatten()
            .map(|&index| &self.records[index])
    }

    /// Records for a task that have not been corrected by a later record.
    pub fn latest_for_task(&self, task_id: &TaskId) -> Vec<&EvidenceRecord> {
        self.query(task_id)
            .filter(|record| !self.superseded.contains(&record.id))
            .collect()
    }

    /// Records appended after `watermark`.
    pub fn since(&self, watermark: EvidenceId) -> &[EvidenceRecord] {
        let start = (watermark.0 as usize).min(self.records.len());
        &self.records[start..]
    }

    /// Id of the newest record, or `EvidenceId(0)` when empty.
    pub fn watermark(&self) -> EvidenceId {
        EvidenceId(self.records.len() as u64)
    }

    pub fn reliability_summary(&self) -> ReliabilitySummary {
        let mut summary = ReliabilitySummary::default();
        for record in &self.records {
            summary.count(record.reliability);
        }
        summary
    }

    pub fn get(&self, id: EvidenceId) -> Option<&EvidenceRecord> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|index| self.records.get(index))
    }

    /// Look up a record, treating a missing id as a dangling citation.
    pub fn resolve(&self, id: EvidenceId) -> Result<&EvidenceRecord> {
        self.get(id)
            .ok_or_else(|| Error::DanglingCitation(format!("【{}】", id)))
    }

    /// Resolve a citation token, including its paragraph range.
    pub fn resolve_citation(&self, token: &CitationToken) -> Result<&EvidenceRecord> {
        let record = self
            .get(token.evidence)
            .ok_or_else(|| Error::DanglingCitation(token.to_string()))?;

        if let CitationSpan::Lines { start, end } = token.span {
            if start == 0 || start > end || end > record.lines.len() {
                return Err(Error::DanglingCitation(token.to_string()));
            }
        }
        Ok(record)
    }

    pub fn is_superseded(&self, id: EvidenceId) -> bool {
        self.superseded.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvidenceRecord> + '_ {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
