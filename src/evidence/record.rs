//! Evidence records and the drafts they are built from.

use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an evidence record. Assigned by the store, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(pub u64);

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far a source can be trusted.
///
/// Ordered from most to least reliable so `min()` picks the best tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityTier {
    VerifiedPrimary,
    Secondary,
    Unverified,
}

impl ReliabilityTier {
    /// `verified_primary` and `secondary` count toward information gain.
    pub fn is_high(self) -> bool {
        matches!(self, ReliabilityTier::VerifiedPrimary | ReliabilityTier::Secondary)
    }
}

impl std::fmt::Display for ReliabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReliabilityTier::VerifiedPrimary => write!(f, "verified_primary"),
            ReliabilityTier::Secondary => write!(f, "secondary"),
            ReliabilityTier::Unverified => write!(f, "unverified"),
        }
    }
}

/// Where a piece of evidence came from: a URL or an opaque document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(pub String);

impl Locator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A question/answer pair extracted from a document by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub question: String,
    pub answer: String,
}

impl Claim {
    pub fn new(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    /// Lowercased, whitespace-collapsed question used to group claims.
    pub fn normalized_question(&self) -> String {
        normalize(&self.question)
    }

    pub fn normalized_answer(&self) -> String {
        normalize(&self.answer)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parsed output of a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub title: Option<String>,
    pub text: String,
    pub reliability: ReliabilityTier,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl FetchedDocument {
    pub fn new(text: &str, reliability: ReliabilityTier) -> Self {
        Self {
            title: None,
            text: text.to_string(),
            reliability,
            claims: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_claim(mut self, question: &str, answer: &str) -> Self {
        self.claims.push(Claim::new(question, answer));
        self
    }
}

/// An immutable entry in the evidence store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: EvidenceId,
    pub locator: Locator,
    pub title: Option<String>,
    pub content: String,
    /// Content split into paragraphs, addressed from 1 by citations.
    pub lines: Vec<String>,
    pub reliability: ReliabilityTier,
    pub claims: Vec<Claim>,
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    /// The record this one corrects, if any.
    pub supersedes: Option<EvidenceId>,
}

impl EvidenceRecord {
    /// Paragraph `n`, counting from 1.
    pub fn line(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    /// The first `max_chars` characters of the content.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let excerpt: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", excerpt.trim_end())
        } else {
            excerpt
        }
    }

    /// Title if present, otherwise the locator.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(self.locator.as_str())
    }
}

/// A record waiting for an id.
///
/// Drafts can only be built from a fetched document, so discovery results
/// never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceDraft {
    task_id: TaskId,
    locator: Locator,
    document: FetchedDocument,
    supersedes: Option<EvidenceId>,
}

impl EvidenceDraft {
    pub(crate) fn from_fetch(task_id: TaskId, locator: Locator, document: FetchedDocument) -> Self {
        Self {
            task_id,
            locator,
            document,
            supersedes: None,
        }
    }

    /// Mark this draft as a correction of an existing record.
    pub fn correcting(mut self, id: EvidenceId) -> Self {
        self.supersedes = Some(id);
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn reliability(&self) -> ReliabilityTier {
        self.document.reliability
    }

    pub fn supersedes(&self) -> Option<EvidenceId> {
        self.supersedes
    }

    pub(crate) fn into_record(self, id: EvidenceId) -> EvidenceRecord {
        let lines = split_lines(&self.document.text);
        EvidenceRecord {
            id,
            locator: self.locator,
            title: self.document.title,
            content: self.document.text,
            lines,
            reliability: self.document.reliability,
            claims: self.document.claims,
            task_id: self.task_id,
            created_at: Utc::now(),
            supersedes: self.supersedes,
        }
    }
}

/// Split text into paragraphs on blank lines.
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
