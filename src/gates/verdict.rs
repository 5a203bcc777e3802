//! Gate verdicts and parsing of tagged gate responses.
//!
//! The reasoning capability answers gate requests in tagged text:
//!
//! ```text
//! <validation_result>false</validation_result>
//! <validation_reason>Only one market is covered.</validation_reason>
//! <validation_suggestion>Add a task on regulation.</validation_suggestion>
//! <missing_dimension name="regulation">EU and US rules</missing_dimension>
//! ```
//!
//! The completion gate uses `judge_` tags instead of `validation_`.

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

const TAGS: [&str; 6] = [
    "validation_result",
    "validation_reason",
    "validation_suggestion",
    "judge_result",
    "judge_reason",
    "judge_suggestion",
];

static TAG_RES: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    TAGS.iter()
        .map(|tag| {
            let pattern = format!(r"(?is)<{tag}\s*>(.*?)</{tag}\s*>");
            (*tag, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static MISSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<missing_dimension\s+name\s*=\s*"([^"]*)"\s*>(.*?)</missing_dimension\s*>"#)
        .unwrap()
});

/// Which gate produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Plan,
    Completion,
}

impl GateKind {
    fn tag_prefix(self) -> &'static str {
        match self {
            GateKind::Plan => "validation",
            GateKind::Completion => "judge",
        }
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateKind::Plan => write!(f, "plan"),
            GateKind::Completion => write!(f, "completion"),
        }
    }
}

/// One reason a gate rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictIssue {
    pub dimension: String,
    pub missing_detail: String,
    /// The task the issue concerns, when there is one.
    pub task_id: Option<TaskId>,
}

impl VerdictIssue {
    pub fn new(dimension: &str, missing_detail: &str) -> Self {
        Self {
            dimension: dimension.to_string(),
            missing_detail: missing_detail.to_string(),
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub gate: GateKind,
    pub issues: Vec<VerdictIssue>,
    pub rationale: Option<String>,
}

impl ValidationVerdict {
    pub fn accept(gate: GateKind) -> Self {
        Self {
            accepted: true,
            gate,
            issues: Vec::new(),
            rationale: None,
        }
    }

    /// Accept if there are no issues, reject otherwise.
    pub fn from_issues(gate: GateKind, issues: Vec<VerdictIssue>) -> Self {
        Self {
            accepted: issues.is_empty(),
            gate,
            issues,
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: &str) -> Self {
        self.rationale = Some(rationale.to_string());
        self
    }

    /// Fold in a second-tier verdict. A later verdict can add rejections but
    /// never turn a rejection into an acceptance.
    pub fn merge(mut self, other: ValidationVerdict) -> Self {
        self.accepted = self.accepted && other.accepted;
        self.issues.extend(other.issues);
        if self.rationale.is_none() {
            self.rationale = other.rationale;
        }
        self
    }
}

/// A parsed gate response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    pub accepted: bool,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
    pub missing: Vec<(String, String)>,
}

fn tag<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    TAG_RES
        .get(name)?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Parse the tagged response for `gate`.
///
/// # Errors
/// `MalformedResponse` if the result tag is missing or not a boolean.
pub fn parse_gate_response(text: &str, gate: GateKind) -> Result<GateResponse> {
    let prefix = gate.tag_prefix();
    let result_tag = format!("{prefix}_result");

    let raw = tag(text, &result_tag)
        .ok_or_else(|| Error::MalformedResponse(format!("missing <{result_tag}> tag")))?;
    let accepted = match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => {
            return Err(Error::MalformedResponse(format!(
                "unrecognized <{result_tag}> value: {other}"
            )))
        }
    };

    let missing = MISSING_RE
        .captures_iter(text)
        .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
        .collect();

    Ok(GateResponse {
        accepted,
        reason: tag(text, &format!("{prefix}_reason")).map(str::to_string),
        suggestion: tag(text, &format!("{prefix}_suggestion")).map(str::to_string),
        missing,
    })
}

impl GateResponse {
    /// Turn the response into a verdict. A rejection always carries at least
    /// one issue.
    pub fn into_verdict(self, gate: GateKind) -> ValidationVerdict {
        let mut issues: Vec<VerdictIssue> = self
            .missing
            .iter()
            .map(|(dimension, detail)| VerdictIssue::new(dimension, detail))
            .collect();

        if !self.accepted && issues.is_empty() {
            let detail = self
                .suggestion
                .as_deref()
                .or(self.reason.as_deref())
                .unwrap_or("rejected without detail");
            issues.push(VerdictIssue::new("review", detail));
        }

        ValidationVerdict {
            accepted: self.accepted,
            gate,
            issues: if self.accepted { Vec::new() } else { issues },
            rationale: self.reason,
        }
    }
}
