//! Evidence collection and diagnostics for kubetriage
//!
//! This crate holds the two pieces with real logic: the evidence collector,
//! which assembles a best-effort snapshot of one deployment's cluster state,
//! and the diagnostic engine, a pure function that reduces that snapshot to
//! an ordered list of findings.

mod collect;
mod engine;

pub use collect::EvidenceCollector;
pub use engine::{DiagnosisConfig, diagnose};

// Re-export types that are used in our public API
pub use kubetriage_types::{
    CollectionError, DeploymentSnapshot, EvidenceKind, Finding, FindingCategory, Severity,
};
