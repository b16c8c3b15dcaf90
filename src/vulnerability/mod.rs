//! Continuous vulnerability remediation
//!
//! Scanner port and adapters, normalisation, scoring, the fix ledger,
//! identifier-keyed issue reconciliation and the single-flight reconciler.

pub mod adapters;
pub mod autofix;
pub mod issues;
pub mod normalize;
pub mod reconciler;
pub mod scanner;
pub mod scoring;
pub mod types;

pub use adapters::{CargoAuditScanner, GitleaksScanner, NpmAuditScanner};
pub use autofix::{FixLedger, FixReport};
pub use reconciler::{CycleOutcome, CycleReport, VulnerabilityReconciler};
pub use scanner::{CollectedFindings, ScannerSet, VulnerabilityScanner};
pub use scoring::VulnerabilityScore;
pub use types::{
    ScanFindings, ScanReport, ScannerFamily, Severity, Vulnerability, VulnerabilityId,
    VulnerabilitySource,
};
