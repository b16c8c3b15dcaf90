//! Audit trail verification

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::audit::entry::{AuditEvent, AuditLogEntry};

/// Verify genesis, per-entry hashes, chain links, sequence numbers and
/// timestamp ordering.
pub fn verify_audit_log(entries: &[AuditLogEntry]) -> Result<()> {
    let first = entries.first().ok_or_else(|| anyhow!("Empty audit log"))?;
    if first.event != AuditEvent::Genesis {
        return Err(anyhow!("First entry must be genesis"));
    }

    for (i, entry) in entries.iter().enumerate() {
        if !entry.verify_hash() {
            return Err(anyhow!("Invalid hash in entry {}", i));
        }
        if entry.sequence != i as u64 {
            return Err(anyhow!(
                "Sequence gap at entry {}: found sequence {}",
                i,
                entry.sequence
            ));
        }
    }

    for (i, pair) in entries.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.previous_log_hash != prev.this_log_hash {
            return Err(anyhow!(
                "Hash chain broken at entry {}: expected {}, got {}",
                i + 1,
                prev.this_log_hash,
                curr.previous_log_hash
            ));
        }
        if curr.timestamp < prev.timestamp {
            return Err(anyhow!(
                "Non-monotonic timestamp at entry {}: {} < {}",
                i + 1,
                curr.timestamp,
                prev.timestamp
            ));
        }
    }

    info!("Audit log verification successful: {} entries", entries.len());
    Ok(())
}

pub fn load_audit_log_from_file(path: &Path) -> Result<Vec<AuditLogEntry>> {
    let file = File::open(path).map_err(|e| anyhow!("Failed to open audit log file: {}", e))?;

    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| anyhow!("Failed to read line {}: {}", line_num + 1, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditLogEntry = serde_json::from_str(&line)
            .map_err(|e| anyhow!("Failed to parse entry at line {}: {}", line_num + 1, e))?;
        entries.push(entry);
    }

    debug!("Loaded {} entries from {:?}", entries.len(), path);
    Ok(entries)
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub entry_count: usize,
    pub overrides: usize,
    pub merges: usize,
    pub merge_failures: usize,
    pub error_message: Option<String>,
}

impl VerificationResult {
    pub fn summary(&self) -> String {
        if self.is_valid {
            format!(
                "✅ Audit log is valid ({} entries: {} merges, {} overrides, {} merge failures)",
                self.entry_count, self.merges, self.overrides, self.merge_failures
            )
        } else {
            format!(
                "❌ Audit log is invalid ({} entries): {}",
                self.entry_count,
                self.error_message.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

/// Verify a trail file, reporting failure in the result instead of as an error
pub fn verify_audit_log_detailed(path: &Path) -> VerificationResult {
    let entries = match load_audit_log_from_file(path) {
        Ok(entries) => entries,
        Err(e) => {
            return VerificationResult {
                is_valid: false,
                entry_count: 0,
                overrides: 0,
                merges: 0,
                merge_failures: 0,
                error_message: Some(e.to_string()),
            }
        }
    };

    let count = |event| entries.iter().filter(|e| e.event == event).count();
    let error_message = verify_audit_log(&entries).err().map(|e| e.to_string());

    VerificationResult {
        is_valid: error_message.is_none(),
        entry_count: entries.len(),
        overrides: count(AuditEvent::GateOverride),
        merges: count(AuditEvent::Merge),
        merge_failures: count(AuditEvent::MergeFailure),
        error_message,
    }
}
