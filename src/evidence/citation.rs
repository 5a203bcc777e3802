//! Citation tokens and report resolution.
//!
//! Token grammar:
//!
//! ```text
//! 【7】          record 7, its excerpt (same as 【7†S1】)
//! 【7†S1】       record 7, its excerpt
//! 【7†L3】       record 7, paragraph 3
//! 【7†L3-L5】    record 7, paragraphs 3 through 5
//! 【3, 5†L2】    compound block: 【3†S1】 and 【5†L2】
//! 【3†L2, 5†L4】 compound block: 【3†L2】 and 【5†L4】
//! ```
//!
//! Each item of a compound block carries its own span.

use super::record::EvidenceId;
use super::store::EvidenceStore;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"【([^】]*)】").unwrap());

static LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Ll](\d+)(?:\s*-\s*[Ll]?(\d+))?$").unwrap());

/// Which part of a record a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CitationSpan {
    Excerpt,
    Lines { start: usize, end: usize },
}

/// A single reference to one evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationToken {
    pub evidence: EvidenceId,
    pub span: CitationSpan,
}

impl CitationToken {
    pub fn excerpt(evidence: EvidenceId) -> Self {
        Self {
            evidence,
            span: CitationSpan::Excerpt,
        }
    }

    pub fn lines(evidence: EvidenceId, start: usize, end: usize) -> Self {
        Self {
            evidence,
            span: CitationSpan::Lines { start, end },
        }
    }
}

impl std::fmt::Display for CitationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.span {
            CitationSpan::Excerpt => write!(f, "【{}†S1】", self.evidence),
            CitationSpan::Lines { start, end } if start == end => {
                write!(f, "【{}†L{}】", self.evidence, start)
            }
            CitationSpan::Lines { start, end } => {
                write!(f, "【{}†L{}-L{}】", self.evidence, start, end)
            }
        }
    }
}

/// Parse the inside of one `【…】` block into its tokens.
///
/// Items are separated by commas; an item without `†` cites the excerpt.
pub fn parse_block(inner: &str) -> Result<Vec<CitationToken>> {
    let malformed = || Error::DanglingCitation(format!("【{}】", inner));

    let tokens = inner
        .split([',', '，'])
        .map(|item| parse_item(item.trim()).ok_or_else(malformed))
        .collect::<Result<Vec<_>>>()?;

    if tokens.is_empty() {
        return Err(malformed());
    }
    Ok(tokens)
}

fn parse_item(item: &str) -> Option<CitationToken> {
    let (id, span) = match item.split_once('†') {
        Some((id, span)) => (id, parse_span(span.trim())?),
        None => (item, CitationSpan::Excerpt),
    };
    let n = id.trim().parse::<u64>().ok()?;
    Some(CitationToken {
        evidence: EvidenceId(n),
        span,
    })
}

fn parse_span(span: &str) -> Option<CitationSpan> {
    if span.eq_ignore_ascii_case("s1") {
        return Some(CitationSpan::Excerpt);
    }
    let caps = LINES_RE.captures(span)?;
    let start: usize = caps.get(1)?.as_str().parse().ok()?;
    let end: usize = match caps.get(2) {
        Some(end) => end.as_str().parse().ok()?,
        None => start,
    };
    Some(CitationSpan::Lines { start, end })
}

/// Every token in `text`, in order of appearance.
pub fn extract(text: &str) -> Result<Vec<CitationToken>> {
    let mut tokens = Vec::new();
    for caps in BLOCK_RE.captures_iter(text) {
        tokens.extend(parse_block(&caps[1])?);
    }
    Ok(tokens)
}

/// A report whose citations have all been checked against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReport {
    pub text: String,
    /// Distinct tokens in order of first appearance.
    pub references: Vec<CitationToken>,
}

/// Split compound blocks, resolve every token, and append a references
/// section.
///
/// # Errors
/// `DanglingCitation` for a malformed block, an unknown id, or a paragraph
/// range the record does not have.
pub fn resolve_report(text: &str, store: &EvidenceStore) -> Result<ResolvedReport> {
    let mut references: Vec<CitationToken> = Vec::new();
    let mut rewritten = String::with_capacity(text.len());
    let mut last = 0;

    for caps in BLOCK_RE.captures_iter(text) {
        let block = caps.get(0).ok_or_else(|| Error::DanglingCitation(text.to_string()))?;
        rewritten.push_str(&text[last..block.start()]);
        for token in parse_block(&caps[1])? {
            store.resolve_citation(&token)?;
            rewritten.push_str(&token.to_string());
            if !references.contains(&token) {
                references.push(token);
            }
        }
        last = block.end();
    }
    rewritten.push_str(&text[last..]);

    if !references.is_empty() {
        rewritten.push_str("\n\n## References\n\n");
        for token in &references {
            let record = store.resolve_citation(token)?;
            rewritten.push_str(&format!(
                "- {} {}: {}\n",
                token,
                record.display_title(),
                record.locator
            ));
        }
    }

    Ok(ResolvedReport {
        text: rewritten,
        references,
    })
}
