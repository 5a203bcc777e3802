//! Validation gates.
//!
//! Both gates are two-tier: deterministic predicates first, then an optional
//! review by the reasoning capability that can only add rejections.

pub mod completion;
pub mod plan;
pub mod verdict;

pub use completion::{CompletionJudge, CompletionJudgeConfig};
pub use plan::{PlanValidator, PlanValidatorConfig, TierMinimums};
pub use verdict::{parse_gate_response, GateKind, GateResponse, ValidationVerdict, VerdictIssue};
