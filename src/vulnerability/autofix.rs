//! Automatic remediation with an identifier-keyed ledger
//!
//! A fix is attempted at most once per vulnerability identifier for the
//! lifetime of the ledger. Failed attempts are recorded too, so a broken
//! update command is not re-run every cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::vulnerability::scanner::ScannerSet;
use crate::vulnerability::types::{Vulnerability, VulnerabilityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixOutcome {
    Applied,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct FixLedger {
    attempts: BTreeMap<VulnerabilityId, FixOutcome>,
}

impl FixLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempted(&self, id: &VulnerabilityId) -> bool {
        self.attempts.contains_key(id)
    }

    pub fn outcome(&self, id: &VulnerabilityId) -> Option<FixOutcome> {
        self.attempts.get(id).copied()
    }

    pub fn record(&mut self, id: VulnerabilityId, outcome: FixOutcome) {
        self.attempts.insert(id, outcome);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    pub applied: Vec<VulnerabilityId>,
    pub failed: Vec<VulnerabilityId>,
    pub skipped: Vec<VulnerabilityId>,
}

impl FixReport {
    pub fn attempts(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// Run the ecosystem update action for every fixable finding not yet in the ledger
pub async fn apply_fixes(
    scanners: &ScannerSet,
    ledger: &mut FixLedger,
    vulnerabilities: &[Vulnerability],
) -> FixReport {
    let mut report = FixReport::default();

    for vulnerability in vulnerabilities.iter().filter(|v| v.fix_available) {
        if ledger.attempted(&vulnerability.id) {
            report.skipped.push(vulnerability.id.clone());
            continue;
        }

        match scanners.apply_fix(vulnerability).await {
            Ok(()) => {
                info!("Applied fix for {}", vulnerability.id);
                ledger.record(vulnerability.id.clone(), FixOutcome::Applied);
                report.applied.push(vulnerability.id.clone());
            }
            Err(e) => {
                warn!("Fix for {} failed: {}", vulnerability.id, e);
                ledger.record(vulnerability.id.clone(), FixOutcome::Failed);
                report.failed.push(vulnerability.id.clone());
            }
        }
    }

    report
}
