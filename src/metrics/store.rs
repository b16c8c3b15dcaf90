//! Metrics aggregation and security report persistence
//!
//! The store is the only owner of metrics state; components record events
//! through its methods. Snapshots are persisted as dated JSON files next to a
//! `latest.json` copy and reloaded at startup so trend deltas survive
//! restarts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::enforcement::DecisionState;
use crate::error::Result;
use crate::metrics::snapshot::{CycleMetrics, MetricsSnapshot, TrendDeltas};
use crate::risk::RiskLevel;
use crate::vulnerability::types::VulnerabilityId;

/// MTTR, MTTD and false-positive rate are computed over this window
pub const OBSERVATION_WINDOW_DAYS: i64 = 30;
pub const LATEST_FILE: &str = "latest.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCounters {
    pub merged: u64,
    pub blocked: u64,
    pub manual_review_requested: u64,
    pub awaiting_approval: u64,
    pub merge_failed: u64,
    pub overrides: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: Option<VulnerabilityId>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub false_positive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: VulnerabilityId,
    pub published_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    snapshots: Vec<MetricsSnapshot>,
    resolutions: Vec<Resolution>,
    detections: Vec<Detection>,
    /// Last time each identifier was reported, for first-detection dedup
    last_seen: HashMap<VulnerabilityId, DateTime<Utc>>,
    decisions: DecisionCounters,
}

impl Inner {
    /// Drop events that can no longer fall inside the observation window.
    /// An identifier is forgotten once it has gone unreported that long.
    fn prune(&mut self, now: DateTime<Utc>) {
        let since = now - Duration::days(OBSERVATION_WINDOW_DAYS);
        self.resolutions.retain(|r| r.closed_at >= since);
        self.detections.retain(|d| d.detected_at >= since);
        self.last_seen.retain(|_, seen| *seen >= since);
    }
}

pub struct MetricsStore {
    dir: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl MetricsStore {
    /// Store that keeps everything in memory
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store persisting to `dir`, seeded with the snapshots already there
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let snapshots = load_history(&dir)?;
        info!("Loaded {} metrics snapshots from {:?}", snapshots.len(), dir);

        Ok(Self {
            dir: Some(dir),
            inner: Mutex::new(Inner {
                snapshots,
                ..Inner::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_decision(&self, state: DecisionState, overridden: bool) {
        let mut inner = self.lock();
        let counters = &mut inner.decisions;
        match state {
            DecisionState::Merged => counters.merged += 1,
            DecisionState::Blocked => counters.blocked += 1,
            DecisionState::ManualReviewRequested => counters.manual_review_requested += 1,
            DecisionState::AwaitingApproval => counters.awaiting_approval += 1,
            DecisionState::MergeFailed => counters.merge_failed += 1,
            other => debug!("Ignoring non-terminal decision state {:?}", other),
        }
        if overridden {
            counters.overrides += 1;
        }
    }

    pub fn record_resolution(&self, resolution: Resolution) {
        self.lock().resolutions.push(resolution);
    }

    /// Record first detection of a finding with a known publication date.
    /// Repeat detections of the same identifier only refresh when it was
    /// last seen.
    pub fn record_detection(&self, detection: Detection) {
        let mut inner = self.lock();
        let first = inner
            .last_seen
            .insert(detection.id.clone(), detection.detected_at)
            .is_none();
        if first {
            inner.detections.push(detection);
        }
    }

    pub fn decision_counters(&self) -> DecisionCounters {
        self.lock().decisions
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.lock().snapshots.last().cloned()
    }

    pub fn history(&self) -> Vec<MetricsSnapshot> {
        self.lock().snapshots.clone()
    }

    /// Mean hours from issue creation to close, over the observation window
    pub fn mttr_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        let inner = self.lock();
        let since = now - Duration::days(OBSERVATION_WINDOW_DAYS);
        mean_hours(
            inner
                .resolutions
                .iter()
                .filter(|r| r.closed_at >= since)
                .map(|r| r.closed_at - r.opened_at),
        )
    }

    /// Mean hours from advisory publication to first detection
    pub fn mttd_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        let inner = self.lock();
        let since = now - Duration::days(OBSERVATION_WINDOW_DAYS);
        mean_hours(
            inner
                .detections
                .iter()
                .filter(|d| d.detected_at >= since)
                .map(|d| d.detected_at - d.published_at),
        )
    }

    pub fn false_positive_rate(&self, now: DateTime<Utc>) -> f64 {
        let inner = self.lock();
        let since = now - Duration::days(OBSERVATION_WINDOW_DAYS);
        let recent: Vec<&Resolution> = inner
            .resolutions
            .iter()
            .filter(|r| r.closed_at >= since)
            .collect();

        if recent.is_empty() {
            return 0.0;
        }
        let false_positives = recent.iter().filter(|r| r.false_positive).count();
        false_positives as f64 / recent.len() as f64 * 100.0
    }

    fn trends(&self, total: u32, now: DateTime<Utc>) -> TrendDeltas {
        let inner = self.lock();
        let delta_against = |age: Duration| {
            inner
                .snapshots
                .iter()
                .filter(|s| s.timestamp <= now - age)
                .last()
                .map(|s| total as i64 - s.total_findings as i64)
        };

        TrendDeltas {
            week_over_week: delta_against(Duration::days(7)),
            month_over_month: delta_against(Duration::days(30)),
        }
    }

    /// Build the snapshot for one cycle, append it and persist it
    pub fn record_cycle(&self, cycle: &CycleMetrics, now: DateTime<Utc>) -> Result<MetricsSnapshot> {
        let dependency_findings = cycle.counts.total();
        let total_findings = dependency_findings + cycle.secrets;

        let confidence = if cycle.scanners_total == 0 {
            0.0
        } else {
            let reporting = cycle
                .scanners_total
                .saturating_sub(cycle.degraded_scanners.len() as u32);
            reporting as f64 / cycle.scanners_total as f64
        };

        self.lock().prune(now);

        let snapshot = MetricsSnapshot {
            timestamp: now,
            counts: cycle.counts,
            dependency_findings,
            secret_findings: cycle.secrets,
            total_findings,
            risk_score: cycle.risk_score,
            risk_level: RiskLevel::from_score(cycle.risk_score),
            fixes_applied: cycle.fixes_applied,
            fixes_failed: cycle.fixes_failed,
            issues_opened: cycle.issues_opened,
            manual_review_opened: cycle.manual_review_opened,
            issues_closed: cycle.issues_closed,
            issue_reconciliation_skipped: cycle.issue_reconciliation_skipped,
            degraded_scanners: cycle.degraded_scanners.clone(),
            confidence,
            mttr_hours: self.mttr_hours(now),
            mttd_hours: self.mttd_hours(now),
            false_positive_rate: self.false_positive_rate(now),
            trends: self.trends(total_findings, now),
        };

        self.lock().snapshots.push(snapshot.clone());

        if let Some(dir) = &self.dir {
            persist(dir, &snapshot)?;
        }

        Ok(snapshot)
    }
}

fn mean_hours(durations: impl Iterator<Item = Duration>) -> Option<f64> {
    let (sum, count) = durations.fold((0i64, 0u32), |(sum, count), d| {
        (sum + d.num_seconds().max(0), count + 1)
    });
    if count == 0 {
        None
    } else {
        Some(sum as f64 / count as f64 / 3600.0)
    }
}

pub fn snapshot_file_name(timestamp: DateTime<Utc>) -> String {
    format!("metrics-{}.json", timestamp.format("%Y%m%dT%H%M%S%.3fZ"))
}

fn persist(dir: &Path, snapshot: &MetricsSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let path = dir.join(snapshot_file_name(snapshot.timestamp));
    fs::write(&path, &json)?;
    fs::write(dir.join(LATEST_FILE), &json)?;
    debug!("Wrote security report {:?}", path);
    Ok(())
}

/// Read every dated snapshot in `dir`, oldest first. Unreadable files are
/// skipped with a warning.
pub fn load_history(dir: &Path) -> Result<Vec<MetricsSnapshot>> {
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_snapshot = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("metrics-") && n.ends_with(".json"))
            .unwrap_or(false);
        if !is_snapshot {
            continue;
        }

        match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<MetricsSnapshot>(&s).map_err(|e| e.to_string()))
        {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => warn!("Skipping unreadable snapshot {:?}: {}", path, e),
        }
    }

    snapshots.sort_by_key(|s| s.timestamp);
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulnerability::types::{ScannerFamily, SeverityCounts};
    use tempfile::TempDir;

    fn cycle(critical: u32) -> CycleMetrics {
        CycleMetrics {
            counts: SeverityCounts {
                critical,
                ..SeverityCounts::default()
            },
            scanners_total: 3,
            ..CycleMetrics::default()
        }
    }

    #[test]
    fn test_mttr_over_window() {
        let store = MetricsStore::in_memory();
        let now = Utc::now();
        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::hours(10),
            closed_at: now - Duration::hours(2),
            false_positive: false,
        });
        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::hours(4),
            closed_at: now,
            false_positive: false,
        });
        // outside the window
        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::days(90),
            closed_at: now - Duration::days(60),
            false_positive: false,
        });

        assert_eq!(store.mttr_hours(now), Some(6.0));
    }

    #[test]
    fn test_false_positive_rate() {
        let store = MetricsStore::in_memory();
        let now = Utc::now();
        assert_eq!(store.false_positive_rate(now), 0.0);

        for fp in [true, false, false, false] {
            store.record_resolution(Resolution {
                id: None,
                opened_at: now - Duration::hours(1),
                closed_at: now,
                false_positive: fp,
            });
        }
        assert_eq!(store.false_positive_rate(now), 25.0);
    }

    #[test]
    fn test_repeat_detection_ignored() {
        let store = MetricsStore::in_memory();
        let now = Utc::now();
        let id = VulnerabilityId::dependency(ScannerFamily::Npm, "a", "1");
        store.record_detection(Detection {
            id: id.clone(),
            published_at: now - Duration::hours(12),
            detected_at: now,
        });
        store.record_detection(Detection {
            id,
            published_at: now - Duration::hours(12),
            detected_at: now + Duration::hours(24),
        });
        assert_eq!(store.mttd_hours(now), Some(12.0));
    }

    #[test]
    fn test_cycle_prunes_events_outside_window() {
        let store = MetricsStore::in_memory();
        let now = Utc::now();
        let old = VulnerabilityId::dependency(ScannerFamily::Npm, "old", "1");
        let current = VulnerabilityId::dependency(ScannerFamily::Npm, "current", "2");

        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::days(90),
            closed_at: now - Duration::days(60),
            false_positive: false,
        });
        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::hours(3),
            closed_at: now,
            false_positive: false,
        });
        for id in [&old, &current] {
            store.record_detection(Detection {
                id: id.clone(),
                published_at: now - Duration::days(50),
                detected_at: now - Duration::days(40),
            });
        }
        // still reported, so it must not count as a new detection later
        store.record_detection(Detection {
            id: current.clone(),
            published_at: now - Duration::days(50),
            detected_at: now,
        });

        store.record_cycle(&cycle(0), now).unwrap();

        {
            let inner = store.lock();
            assert_eq!(inner.resolutions.len(), 1);
            assert!(inner.detections.is_empty());
            assert!(inner.last_seen.contains_key(&current));
            assert!(!inner.last_seen.contains_key(&old));
        }

        store.record_detection(Detection {
            id: current,
            published_at: now - Duration::days(50),
            detected_at: now + Duration::hours(1),
        });
        assert_eq!(store.mttd_hours(now), None);
        assert_eq!(store.mttr_hours(now), Some(3.0));
    }

    #[test]
    fn test_degraded_cycle_has_reduced_confidence() {
        let store = MetricsStore::in_memory();
        let mut metrics = cycle(0);
        metrics.degraded_scanners = vec![ScannerFamily::Cargo];

        let snapshot = store.record_cycle(&metrics, Utc::now()).unwrap();
        assert!(snapshot.is_degraded());
        assert!((snapshot.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshots_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();

        {
            let store = MetricsStore::open(dir.path()).unwrap();
            store.record_cycle(&cycle(5), now - Duration::days(8)).unwrap();
            store.record_cycle(&cycle(2), now - Duration::days(1)).unwrap();
        }
        assert!(dir.path().join(LATEST_FILE).exists());

        let store = MetricsStore::open(dir.path()).unwrap();
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.latest().unwrap().counts.critical, 2);

        let snapshot = store.record_cycle(&cycle(3), now).unwrap();
        assert_eq!(snapshot.trends.week_over_week, Some(-2));
        assert_eq!(snapshot.trends.month_over_month, None);
    }

    #[test]
    fn test_decision_counters() {
        let store = MetricsStore::in_memory();
        store.record_decision(DecisionState::Merged, false);
        store.record_decision(DecisionState::Merged, true);
        store.record_decision(DecisionState::Blocked, false);
        store.record_decision(DecisionState::GateChecked, false);

        let counters = store.decision_counters();
        assert_eq!(counters.merged, 2);
        assert_eq!(counters.blocked, 1);
        assert_eq!(counters.overrides, 1);
    }
}
