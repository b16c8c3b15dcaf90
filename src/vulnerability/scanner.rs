//! Scanner port and partial-failure tolerant collection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::external;
use crate::vulnerability::types::{ScanFindings, ScanReport, ScannerFamily, Vulnerability};

/// A vulnerability scanner for one family (dependency ecosystem or secrets)
#[async_trait]
pub trait VulnerabilityScanner: Send + Sync {
    fn family(&self) -> ScannerFamily;

    /// Run the scan and return its raw findings
    async fn scan(&self) -> Result<ScanFindings>;

    /// Apply the ecosystem's update action for one finding
    async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerFailure {
    pub family: ScannerFamily,
    pub error: String,
}

/// Output of one collection pass over every configured scanner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedFindings {
    pub reports: Vec<ScanReport>,
    pub failures: Vec<ScannerFailure>,
}

impl CollectedFindings {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_families(&self) -> Vec<ScannerFamily> {
        self.failures.iter().map(|f| f.family).collect()
    }
}

#[derive(Clone)]
pub struct ScannerSet {
    scanners: Vec<Arc<dyn VulnerabilityScanner>>,
    timeout: Duration,
}

impl ScannerSet {
    pub fn new(scanners: Vec<Arc<dyn VulnerabilityScanner>>, timeout: Duration) -> Self {
        Self { scanners, timeout }
    }

    pub fn families(&self) -> Vec<ScannerFamily> {
        self.scanners.iter().map(|s| s.family()).collect()
    }

    pub fn scanner_for(&self, family: ScannerFamily) -> Option<Arc<dyn VulnerabilityScanner>> {
        self.scanners.iter().find(|s| s.family() == family).cloned()
    }

    /// Query every scanner independently. A failing scanner contributes an
    /// empty report for its own family and is listed in `failures`.
    pub async fn collect(&self) -> CollectedFindings {
        let mut collected = CollectedFindings::default();

        for scanner in &self.scanners {
            let family = scanner.family();
            let (findings, error) = external::call_or_default(
                family.name(),
                self.timeout,
                scanner.scan(),
                ScanFindings::empty_for(family),
            )
            .await;

            if let Some(error) = error {
                warn!("Scanner {} failed, continuing with empty result: {}", family, error);
                collected.failures.push(ScannerFailure {
                    family,
                    error: error.to_string(),
                });
            } else {
                debug!("Scanner {} completed", family);
            }

            collected.reports.push(ScanReport { family, findings });
        }

        collected
    }

    /// Apply a fix through the scanner owning the finding's family
    pub async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()> {
        let scanner = self.scanner_for(vulnerability.family).ok_or_else(|| {
            crate::error::SecurityGateError::ScannerError(format!(
                "No scanner configured for family {}",
                vulnerability.family
            ))
        })?;

        external::call(
            vulnerability.family.name(),
            self.timeout,
            scanner.apply_fix(vulnerability),
        )
        .await
    }
}
