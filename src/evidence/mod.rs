//! Evidence gathered during a research session.
//!
//! Records are appended by the executor from drafts the dispatcher builds,
//! and are cited in the final report by id.

pub mod analysis;
pub mod citation;
pub mod record;
pub mod store;

pub use analysis::{
    assess_sufficiency, detect_contradictions, Contradiction, EvidenceSummary, Sufficiency,
    TaskEvidence,
};
pub use citation::{resolve_report, CitationSpan, CitationToken, ResolvedReport};
pub use record::{
    Claim, EvidenceDraft, EvidenceId, EvidenceRecord, FetchedDocument, Locator, ReliabilityTier,
};
pub use store::{EvidenceStore, ReliabilitySummary};
