//! Threshold alerts over metrics snapshots
//!
//! At most one alert per breached metric is raised per snapshot. An alert
//! type that was dispatched within the cooldown window is suppressed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::AlertThresholds;
use crate::metrics::snapshot::MetricsSnapshot;
use crate::notify::{self, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    MttrExceeded,
    MttdExceeded,
    CriticalVulnerabilities,
    HighVulnerabilities,
    HighFalsePositiveRate,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::MttrExceeded => "MTTR_EXCEEDED",
            AlertType::MttdExceeded => "MTTD_EXCEEDED",
            AlertType::CriticalVulnerabilities => "CRITICAL_VULNERABILITIES",
            AlertType::HighVulnerabilities => "HIGH_VULNERABILITIES",
            AlertType::HighFalsePositiveRate => "HIGH_FALSE_POSITIVE_RATE",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Alerts for every threshold the snapshot exceeds
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let mut check = |alert_type, severity, value: Option<f64>, threshold: f64, what: &str| {
        if let Some(value) = value {
            if value > threshold {
                alerts.push(Alert {
                    alert_type,
                    severity,
                    message: format!("{} is {:.1}, above the threshold of {:.1}", what, value, threshold),
                    value,
                    threshold,
                });
            }
        }
    };

    check(
        AlertType::MttrExceeded,
        AlertSeverity::Warning,
        snapshot.mttr_hours,
        thresholds.mttr,
        "Mean time to resolution (hours)",
    );
    check(
        AlertType::MttdExceeded,
        AlertSeverity::Warning,
        snapshot.mttd_hours,
        thresholds.mttd,
        "Mean time to detection (hours)",
    );
    check(
        AlertType::CriticalVulnerabilities,
        AlertSeverity::Critical,
        Some(snapshot.critical_total() as f64),
        thresholds.critical_issues,
        "Open critical vulnerabilities",
    );
    check(
        AlertType::HighVulnerabilities,
        AlertSeverity::Warning,
        Some(snapshot.counts.high as f64),
        thresholds.high_issues,
        "Open high vulnerabilities",
    );
    check(
        AlertType::HighFalsePositiveRate,
        AlertSeverity::Warning,
        Some(snapshot.false_positive_rate),
        thresholds.false_positive_rate,
        "False positive rate (%)",
    );

    alerts
}

pub struct AlertEngine {
    thresholds: AlertThresholds,
    cooldown: Duration,
    notifiers: Vec<Arc<dyn Notifier>>,
    channels: Vec<String>,
    timeout: std::time::Duration,
    last_sent: Mutex<HashMap<AlertType, DateTime<Utc>>>,
}

impl AlertEngine {
    pub fn new(
        thresholds: AlertThresholds,
        cooldown: Duration,
        notifiers: Vec<Arc<dyn Notifier>>,
        channels: Vec<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            thresholds,
            cooldown,
            notifiers,
            channels,
            timeout,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate the snapshot, drop alerts still in cooldown and dispatch the
    /// rest. Returns the alerts that were dispatched.
    pub async fn process(&self, snapshot: &MetricsSnapshot, now: DateTime<Utc>) -> Vec<Alert> {
        let alerts = self.admit(evaluate(snapshot, &self.thresholds), now);

        for alert in &alerts {
            warn!("[ALERT] {}: {}", alert.alert_type, alert.message);
            let message = format!(
                "Security alert {} ({:?}): {}",
                alert.alert_type, alert.severity, alert.message
            );
            notify::dispatch(&self.notifiers, &self.channels, &message, self.timeout).await;
        }

        alerts
    }

    fn admit(&self, alerts: Vec<Alert>, now: DateTime<Utc>) -> Vec<Alert> {
        let mut last_sent = self
            .last_sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        alerts
            .into_iter()
            .filter(|alert| match last_sent.get(&alert.alert_type) {
                Some(sent) if now - *sent < self.cooldown => {
                    info!(
                        "Suppressing {} alert, last sent at {}",
                        alert.alert_type, sent
                    );
                    false
                }
                _ => {
                    last_sent.insert(alert.alert_type, now);
                    true
                }
            })
            .collect()
    }
}
