//! Metrics And Alerting Tests
//!
//! Snapshot persistence and threshold alerts driven by reconciliation
//! cycles.

mod common;

use chrono::{Duration, Utc};
use std::sync::Arc;

use common::*;
use security_gate_app::metrics::alerts::evaluate;
use security_gate_app::metrics::store::{load_history, LATEST_FILE};
use security_gate_app::metrics::{
    AlertEngine, AlertType, CycleMetrics, MetricsSnapshot, MetricsStore, Resolution,
};
use security_gate_app::notify::Notifier;
use security_gate_app::vulnerability::types::SeverityCounts;
use security_gate_app::vulnerability::{CycleOutcome, ScannerFamily, Severity};

fn critical_policy() -> security_gate_app::config::SecurityPolicy {
    let mut policy = test_policy();
    policy.auto_fix_enabled = false;
    policy.alert_thresholds.critical_issues = 1.0;
    policy
}

fn cycle(critical: u32, high: u32) -> CycleMetrics {
    CycleMetrics {
        counts: SeverityCounts {
            critical,
            high,
            moderate: 0,
            low: 0,
        },
        scanners_total: 2,
        ..CycleMetrics::default()
    }
}

#[tokio::test]
async fn test_two_criticals_raise_exactly_one_alert() {
    let harness = reconciler_harness(critical_policy());
    harness.npm.set_items(vec![
        dependency("minimist", "GHSA-1", Severity::Critical, false),
        dependency("lodash", "GHSA-2", Severity::Critical, false),
    ]);

    let report = match harness.reconciler.run_cycle().await {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("cycle unexpectedly skipped"),
    };

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].alert_type, AlertType::CriticalVulnerabilities);
    assert_eq!(report.alerts[0].value, 2.0);

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "security");
    assert!(messages[0].1.contains("CRITICAL_VULNERABILITIES"));
}

#[tokio::test]
async fn test_repeated_alert_is_suppressed_during_cooldown() {
    let harness = reconciler_harness(critical_policy());
    harness.npm.set_items(vec![
        dependency("minimist", "GHSA-1", Severity::Critical, false),
        dependency("lodash", "GHSA-2", Severity::Critical, false),
    ]);

    let first = harness.reconciler.run_cycle().await;
    let second = harness.reconciler.run_cycle().await;

    assert_eq!(first.report().map(|r| r.alerts.len()), Some(1));
    assert_eq!(second.report().map(|r| r.alerts.len()), Some(0));
    assert_eq!(harness.notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_alert_fires_again_after_cooldown() {
    let notifier = Arc::new(RecordingNotifier::default());
    let notifiers: Vec<Arc<dyn Notifier>> = vec![notifier.clone()];
    let mut thresholds = quiet_thresholds();
    thresholds.high_issues = 3.0;

    let engine = AlertEngine::new(
        thresholds,
        Duration::minutes(60),
        notifiers,
        vec!["security".to_string(), "oncall".to_string()],
        std::time::Duration::from_secs(1),
    );

    let store = MetricsStore::in_memory();
    let now = Utc::now();
    let snapshot = store.record_cycle(&cycle(0, 5), now).unwrap();

    assert_eq!(engine.process(&snapshot, now).await.len(), 1);
    assert!(engine
        .process(&snapshot, now + Duration::minutes(30))
        .await
        .is_empty());
    assert_eq!(
        engine.process(&snapshot, now + Duration::minutes(61)).await[0].alert_type,
        AlertType::HighVulnerabilities
    );

    // One message per channel per dispatched alert
    assert_eq!(notifier.messages().len(), 4);
}

#[test]
fn test_each_breached_metric_alerts_once() {
    let store = MetricsStore::in_memory();
    let now = Utc::now();
    for _ in 0..3 {
        store.record_resolution(Resolution {
            id: None,
            opened_at: now - Duration::hours(100),
            closed_at: now,
            false_positive: true,
        });
    }
    let snapshot: MetricsSnapshot = store.record_cycle(&cycle(4, 12), now).unwrap();

    let mut thresholds = quiet_thresholds();
    thresholds.mttr = 72.0;
    thresholds.critical_issues = 0.0;
    thresholds.high_issues = 10.0;
    thresholds.false_positive_rate = 10.0;

    let mut types: Vec<&str> = evaluate(&snapshot, &thresholds)
        .iter()
        .map(|a| a.alert_type.as_str())
        .collect();
    types.sort();

    assert_eq!(
        types,
        vec![
            "CRITICAL_VULNERABILITIES",
            "HIGH_FALSE_POSITIVE_RATE",
            "HIGH_VULNERABILITIES",
            "MTTR_EXCEEDED",
        ]
    );
}

#[tokio::test]
async fn test_snapshots_persist_and_reload() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let now = Utc::now();

    {
        let store = MetricsStore::open(dir.path())?;
        store.record_cycle(&cycle(3, 1), now - Duration::days(8))?;
        let mut degraded = cycle(1, 1);
        degraded.degraded_scanners = vec![ScannerFamily::Secrets];
        store.record_cycle(&degraded, now)?;
    }

    let latest: MetricsSnapshot =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(LATEST_FILE))?)?;
    assert_eq!(latest.counts.critical, 1);
    assert!(latest.is_degraded());
    assert_eq!(latest.trends.week_over_week, Some(-2));

    let history = load_history(dir.path())?;
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp < history[1].timestamp);

    // A reopened store keeps computing trends from disk
    let reopened = MetricsStore::open(dir.path())?;
    assert_eq!(reopened.history().len(), 2);
    let next = reopened.record_cycle(&cycle(0, 0), now + Duration::days(1))?;
    assert_eq!(next.trends.week_over_week, Some(-4));

    println!("✅ {} snapshots persisted", load_history(dir.path())?.len());
    Ok(())
}
