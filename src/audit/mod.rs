//! Audit trail
//!
//! Tamper-evident, hash-chained record of merges, gate overrides and merge
//! failures.

pub mod entry;
pub mod logger;
pub mod verify;

pub use entry::{AuditEvent, AuditLogEntry};
pub use logger::AuditLogger;
pub use verify::{
    load_audit_log_from_file, verify_audit_log, verify_audit_log_detailed, VerificationResult,
};
