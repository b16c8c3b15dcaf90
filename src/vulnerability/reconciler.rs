//! Scan, fix and issue reconciliation loop
//!
//! Cycles are single-flight. The run-lock also owns the fix ledger, so only
//! the active cycle can read or write fix attempts. A trigger that finds the
//! lock held is dropped, not queued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::SecurityPolicy;
use crate::enforcement::VulnerabilitySignal;
use crate::external;
use crate::github::VcsClient;
use crate::metrics::{Alert, AlertEngine, CycleMetrics, Detection, MetricsSnapshot, MetricsStore, Resolution};
use crate::vulnerability::autofix::{self, FixLedger, FixReport};
use crate::vulnerability::issues::{self, ReconcileOutcome, VULNERABILITY_LABEL};
use crate::vulnerability::normalize::normalize;
use crate::vulnerability::scanner::{CollectedFindings, ScannerFailure, ScannerSet};
use crate::vulnerability::scoring::{self, VulnerabilityScore};
use crate::vulnerability::types::Vulnerability;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub findings: Vec<Vulnerability>,
    pub score: VulnerabilityScore,
    pub fixes: FixReport,
    pub verification_scan: bool,
    pub scanner_failures: Vec<ScannerFailure>,
    pub issues_opened: Vec<u64>,
    pub manual_review_opened: Vec<u64>,
    pub issues_closed: Vec<u64>,
    /// Standard issues replaced by a manual-review issue
    pub issues_superseded: Vec<u64>,
    pub issue_reconciliation_skipped: bool,
    pub snapshot: Option<MetricsSnapshot>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CycleOutcome {
    Completed(Box<CycleReport>),
    /// Another cycle held the run-lock
    Skipped,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            CycleOutcome::Skipped => None,
        }
    }
}

pub struct VulnerabilityReconciler {
    repo: String,
    policy: Arc<SecurityPolicy>,
    scanners: ScannerSet,
    vcs: Arc<dyn VcsClient>,
    metrics: Arc<MetricsStore>,
    alerts: Arc<AlertEngine>,
    run_lock: Mutex<FixLedger>,
    signal: RwLock<VulnerabilitySignal>,
}

impl VulnerabilityReconciler {
    pub fn new(
        repo: String,
        policy: Arc<SecurityPolicy>,
        scanners: ScannerSet,
        vcs: Arc<dyn VcsClient>,
        metrics: Arc<MetricsStore>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            repo,
            policy,
            scanners,
            vcs,
            metrics,
            alerts,
            run_lock: Mutex::new(FixLedger::new()),
            signal: RwLock::new(VulnerabilitySignal::default()),
        }
    }

    /// Latest repository-wide state for the `noCriticalVulns` gate
    pub fn signal(&self) -> VulnerabilitySignal {
        *self.signal.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(mut ledger) = self.run_lock.try_lock() else {
            warn!("Reconciliation cycle already in progress, skipping trigger");
            return CycleOutcome::Skipped;
        };

        let report = self.cycle(&mut ledger, Utc::now()).await;
        CycleOutcome::Completed(Box::new(report))
    }

    async fn cycle(&self, ledger: &mut FixLedger, now: DateTime<Utc>) -> CycleReport {
        info!("Starting vulnerability reconciliation for {}", self.repo);

        let mut collected = self.scanners.collect().await;
        let mut findings = normalize(&collected.reports);
        self.record_detections(&findings, now);

        let mut fixes = FixReport::default();
        let mut verification_scan = false;
        if self.policy.auto_fix_enabled {
            fixes = autofix::apply_fixes(&self.scanners, ledger, &findings).await;
            if !fixes.applied.is_empty() {
                info!("Applied {} fixes, re-scanning to verify", fixes.applied.len());
                collected = self.scanners.collect().await;
                findings = normalize(&collected.reports);
                verification_scan = true;
            }
        }

        let score = scoring::score(&findings);
        self.update_signal(&score, &collected);

        let (outcome, skipped) = self.reconcile_issues(&findings, &collected).await;
        for (issue, id) in &outcome.closed {
            self.metrics.record_resolution(Resolution {
                id: Some(id.clone()),
                opened_at: issue.created_at,
                closed_at: now,
                false_positive: false,
            });
        }

        let cycle = CycleMetrics {
            counts: score.counts,
            secrets: score.secrets,
            risk_score: score.score,
            fixes_applied: fixes.applied.len() as u32,
            fixes_failed: fixes.failed.len() as u32,
            issues_opened: outcome.opened.len() as u32,
            manual_review_opened: outcome.manual_review_opened.len() as u32,
            issues_closed: outcome.closed.len() as u32,
            issue_reconciliation_skipped: skipped,
            scanners_total: self.scanners.families().len() as u32,
            degraded_scanners: collected.failed_families(),
        };

        let snapshot = match self.metrics.record_cycle(&cycle, now) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!("Failed to persist metrics snapshot: {}", e);
                self.metrics.latest()
            }
        };

        let alerts = match &snapshot {
            Some(snapshot) => self.alerts.process(snapshot, now).await,
            None => Vec::new(),
        };

        info!(
            "Reconciliation finished: {} findings (score {:.1}, {}), {} fixed, {} opened, {} closed",
            findings.len(),
            score.score,
            score.level,
            fixes.applied.len(),
            outcome.opened.len() + outcome.manual_review_opened.len(),
            outcome.closed.len()
        );

        CycleReport {
            started_at: now,
            findings,
            score,
            fixes,
            verification_scan,
            scanner_failures: collected.failures,
            issues_opened: outcome.opened.iter().map(|i| i.number).collect(),
            manual_review_opened: outcome.manual_review_opened.iter().map(|i| i.number).collect(),
            issues_closed: outcome.closed.iter().map(|(i, _)| i.number).collect(),
            issues_superseded: outcome.superseded.iter().map(|i| i.number).collect(),
            issue_reconciliation_skipped: skipped,
            snapshot,
            alerts,
        }
    }

    fn record_detections(&self, findings: &[Vulnerability], now: DateTime<Utc>) {
        for vulnerability in findings {
            if let Some(published_at) = vulnerability.published_at {
                self.metrics.record_detection(Detection {
                    id: vulnerability.id.clone(),
                    published_at,
                    detected_at: now,
                });
            }
        }
    }

    /// A degraded scan can lower the count only for families that reported,
    /// so the previous value is kept when it is higher.
    fn update_signal(&self, score: &VulnerabilityScore, collected: &CollectedFindings) {
        let current = score.counts.critical + score.secrets;
        let mut signal = self
            .signal
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        signal.open_critical = if collected.is_degraded() {
            current.max(signal.open_critical)
        } else {
            current
        };
    }

    async fn reconcile_issues(
        &self,
        findings: &[Vulnerability],
        collected: &CollectedFindings,
    ) -> (ReconcileOutcome, bool) {
        let timeout = self.policy.external_timeout();
        let open_issues = match external::call(
            "vcs",
            timeout,
            self.vcs.list_open_issues(&self.repo, VULNERABILITY_LABEL),
        )
        .await
        {
            Ok(issues) => issues,
            Err(e) => {
                warn!("Cannot list open security issues, skipping issue reconciliation: {}", e);
                return (ReconcileOutcome::default(), true);
            }
        };

        let plan = issues::plan(findings, &open_issues, &collected.failed_families());
        if plan.is_empty() {
            return (ReconcileOutcome::default(), false);
        }

        let outcome = issues::apply_plan(self.vcs.as_ref(), &self.repo, plan, timeout).await;
        (outcome, false)
    }
}
