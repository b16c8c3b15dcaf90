use serde::{Deserialize, Serialize};

use crate::risk::{FactorScores, RiskFactor};

pub const MAX_FACTOR_SCORE: f64 = 10.0;
pub const MAX_TEST_COVERAGE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityChanges {
    pub score: f64,
    pub requires_approval: bool,
    pub has_critical_vulns: bool,
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyChanges {
    pub manifests: Vec<String>,
    pub new_dependencies: Vec<String>,
    pub risk_level: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChanges {
    pub files: Vec<String>,
    pub sensitivity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnFixes {
    pub count: u32,
    pub is_security_fix: bool,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCoverage {
    pub test_lines: usize,
    pub code_lines: usize,
    /// Added test lines per added code line, as a percentage capped at 100
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeComplexity {
    pub branch_points: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRisk {
    pub login: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatus {
    pub approvals: u32,
    pub security_team_approval: bool,
    pub changes_requested: bool,
    pub quality_score: f64,
}

/// Risk features of one change set, recomputed on every assessment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub security_changes: SecurityChanges,
    pub dependency_changes: DependencyChanges,
    pub config_changes: ConfigChanges,
    pub vuln_fixes: VulnFixes,
    pub test_coverage: TestCoverage,
    pub code_complexity: CodeComplexity,
    pub author_risk: AuthorRisk,
    pub review_status: ReviewStatus,
}

impl RiskFactors {
    /// Project every factor onto the common `[0, 10]` scale used by the scorer
    pub fn scores(&self) -> FactorScores {
        let mut scores = FactorScores::default();
        for factor in RiskFactor::ALL {
            let value = match factor {
                RiskFactor::SecurityChanges => self.security_changes.score,
                RiskFactor::DependencyChanges => self.dependency_changes.risk_level,
                RiskFactor::ConfigChanges => self.config_changes.sensitivity,
                RiskFactor::VulnFixes => self.vuln_fixes.count as f64,
                RiskFactor::TestCoverage => self.test_coverage.ratio / 10.0,
                RiskFactor::CodeComplexity => self.code_complexity.score,
                RiskFactor::AuthorRisk => self.author_risk.score,
                RiskFactor::ReviewStatus => self.review_status.quality_score,
            };
            scores.set(factor, value.clamp(0.0, MAX_FACTOR_SCORE));
        }
        scores
    }
}
