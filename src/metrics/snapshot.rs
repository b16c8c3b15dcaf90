use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::vulnerability::types::{ScannerFamily, SeverityCounts};

/// What one reconciliation cycle observed and did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    pub counts: SeverityCounts,
    pub secrets: u32,
    pub risk_score: f64,
    pub fixes_applied: u32,
    pub fixes_failed: u32,
    pub issues_opened: u32,
    pub manual_review_opened: u32,
    pub issues_closed: u32,
    pub issue_reconciliation_skipped: bool,
    pub scanners_total: u32,
    pub degraded_scanners: Vec<ScannerFamily>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendDeltas {
    /// Change in total findings against the newest snapshot at least a week old
    pub week_over_week: Option<i64>,
    pub month_over_month: Option<i64>,
}

/// Aggregate written once per cycle; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub counts: SeverityCounts,
    pub dependency_findings: u32,
    pub secret_findings: u32,
    pub total_findings: u32,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub fixes_applied: u32,
    pub fixes_failed: u32,
    pub issues_opened: u32,
    pub manual_review_opened: u32,
    pub issues_closed: u32,
    pub issue_reconciliation_skipped: bool,
    pub degraded_scanners: Vec<ScannerFamily>,
    /// Share of scanner families that reported, 0.0 to 1.0
    pub confidence: f64,
    pub mttr_hours: Option<f64>,
    pub mttd_hours: Option<f64>,
    /// Percent of resolved issues marked as false positives
    pub false_positive_rate: f64,
    pub trends: TrendDeltas,
}

impl MetricsSnapshot {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_scanners.is_empty()
    }

    /// Critical findings including leaked secrets
    pub fn critical_total(&self) -> u32 {
        self.counts.critical + self.secret_findings
    }
}
