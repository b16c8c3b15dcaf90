//! Security policy loader
//! Loads the YAML policy file that drives gating, merge strategies,
//! remediation and alerting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::SecurityGateError;
use crate::risk::{RiskLevel, RiskWeights};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityGatesConfig {
    pub require_security_scan: bool,
    pub block_on_critical_vulns: bool,
    pub require_test_pass: bool,
    pub require_code_review: bool,
    pub allow_security_override: bool,
}

impl Default for SecurityGatesConfig {
    fn default() -> Self {
        Self {
            require_security_scan: true,
            block_on_critical_vulns: true,
            require_test_pass: true,
            require_code_review: false,
            allow_security_override: false,
        }
    }
}

/// Per-risk-level merge handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStrategy {
    pub auto_merge: bool,
    pub require_approval: bool,
    #[serde(default)]
    pub emergency_protocol: bool,
}

impl MergeStrategy {
    /// Most conservative handling, used when a level has no entry
    pub fn manual() -> Self {
        Self {
            auto_merge: false,
            require_approval: true,
            emergency_protocol: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertThresholds {
    /// Mean time to resolution, hours
    pub mttr: f64,
    /// Mean time to detection, hours
    pub mttd: f64,
    pub critical_issues: f64,
    pub high_issues: f64,
    /// Percent of resolved issues marked as false positives
    pub false_positive_rate: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            mttr: 72.0,
            mttd: 24.0,
            critical_issues: 0.0,
            high_issues: 5.0,
            false_positive_rate: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityPolicy {
    pub security_gates: SecurityGatesConfig,
    pub risk_assessment: BTreeMap<RiskLevel, MergeStrategy>,
    pub auto_fix_enabled: bool,
    pub scan_interval_ms: u64,
    pub alert_thresholds: AlertThresholds,
    pub alert_cooldown_minutes: i64,
    pub external_call_timeout_ms: u64,
    pub security_team: Vec<String>,
    pub risk_weights: RiskWeights,
    pub notification_channels: Vec<String>,
    pub merge_method: MergeMethod,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        let mut risk_assessment = BTreeMap::new();
        risk_assessment.insert(
            RiskLevel::Low,
            MergeStrategy {
                auto_merge: true,
                require_approval: false,
                emergency_protocol: false,
            },
        );
        risk_assessment.insert(
            RiskLevel::Medium,
            MergeStrategy {
                auto_merge: true,
                require_approval: true,
                emergency_protocol: false,
            },
        );
        risk_assessment.insert(
            RiskLevel::High,
            MergeStrategy {
                auto_merge: false,
                require_approval: true,
                emergency_protocol: false,
            },
        );
        risk_assessment.insert(
            RiskLevel::Critical,
            MergeStrategy {
                auto_merge: false,
                require_approval: true,
                emergency_protocol: true,
            },
        );

        Self {
            security_gates: SecurityGatesConfig::default(),
            risk_assessment,
            auto_fix_enabled: true,
            scan_interval_ms: 3_600_000,
            alert_thresholds: AlertThresholds::default(),
            alert_cooldown_minutes: 60,
            external_call_timeout_ms: 30_000,
            security_team: Vec::new(),
            risk_weights: RiskWeights::default(),
            notification_channels: vec!["security".to_string()],
            merge_method: MergeMethod::Squash,
        }
    }
}

impl SecurityPolicy {
    /// Load and validate the policy file
    pub fn load_from_file(path: &Path) -> Result<Self, SecurityGateError> {
        info!("Loading security policy from: {:?}", path);

        if !path.exists() {
            return Err(SecurityGateError::ConfigError(format!(
                "Policy file not found: {:?}",
                path
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            SecurityGateError::ConfigError(format!("Failed to read {:?}: {}", path, e))
        })?;

        let policy = Self::from_yaml_str(&contents)?;
        info!("Security policy loaded and validated");
        Ok(policy)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, SecurityGateError> {
        let policy: SecurityPolicy = serde_yaml::from_str(contents)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Reject policies that could silently weaken gating
    pub fn validate(&self) -> Result<(), SecurityGateError> {
        for level in RiskLevel::ALL {
            let strategy = self
                .risk_assessment
                .get(&level)
                .ok_or_else(|| SecurityGateError::missing_strategy(level.as_str()))?;

            if level.requires_human() && strategy.auto_merge {
                return Err(SecurityGateError::auto_merge_not_allowed(level.as_str()));
            }
        }

        self.risk_weights.validate()?;

        if self.scan_interval_ms == 0 {
            return Err(SecurityGateError::ConfigError(
                "scanIntervalMs must be greater than zero".to_string(),
            ));
        }

        if self.external_call_timeout_ms == 0 {
            return Err(SecurityGateError::ConfigError(
                "externalCallTimeoutMs must be greater than zero".to_string(),
            ));
        }

        if self.alert_cooldown_minutes < 0 {
            return Err(SecurityGateError::ConfigError(format!(
                "alertCooldownMinutes ({}) cannot be negative",
                self.alert_cooldown_minutes
            )));
        }

        let thresholds = &self.alert_thresholds;
        for (name, value) in [
            ("mttr", thresholds.mttr),
            ("mttd", thresholds.mttd),
            ("criticalIssues", thresholds.critical_issues),
            ("highIssues", thresholds.high_issues),
            ("falsePositiveRate", thresholds.false_positive_rate),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(SecurityGateError::ConfigError(format!(
                    "alertThresholds.{} ({}) must be a non-negative number",
                    name, value
                )));
            }
        }

        Ok(())
    }

    pub fn strategy_for(&self, level: RiskLevel) -> MergeStrategy {
        self.risk_assessment
            .get(&level)
            .copied()
            .unwrap_or_else(MergeStrategy::manual)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.alert_cooldown_minutes)
    }
}
