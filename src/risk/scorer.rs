//! Risk scoring for change sets
//!
//! The score is a weighted sum of eight normalised factor scores, clamped to
//! `[0, 10]`. The weight table is plain data loaded with the policy so that
//! scoring stays a pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::RiskFactors;
use crate::error::SecurityGateError;

pub const MAX_RISK_SCORE: f64 = 10.0;
pub const CRITICAL_THRESHOLD: f64 = 8.0;
pub const HIGH_THRESHOLD: f64 = 6.0;
pub const MEDIUM_THRESHOLD: f64 = 3.0;

/// Discrete risk bucket derived from a numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Map a score onto the fixed threshold bands
    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            RiskLevel::Critical
        } else if score >= HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// High and critical changes are never merged without a human
    pub fn requires_human(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low risk: eligible for automatic merge once gates pass",
            RiskLevel::Medium => "Medium risk: merge after an approving review",
            RiskLevel::High => "High risk: security team review required before merge",
            RiskLevel::Critical => {
                "Critical risk: follow the emergency protocol, manual security review required"
            }
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight scored risk factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskFactor {
    SecurityChanges,
    DependencyChanges,
    ConfigChanges,
    VulnFixes,
    TestCoverage,
    CodeComplexity,
    AuthorRisk,
    ReviewStatus,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 8] = [
        RiskFactor::SecurityChanges,
        RiskFactor::DependencyChanges,
        RiskFactor::ConfigChanges,
        RiskFactor::VulnFixes,
        RiskFactor::TestCoverage,
        RiskFactor::CodeComplexity,
        RiskFactor::AuthorRisk,
        RiskFactor::ReviewStatus,
    ];

    /// Factors whose growth lowers risk and therefore carry negative weights
    pub fn reduces_risk(&self) -> bool {
        matches!(
            self,
            RiskFactor::VulnFixes | RiskFactor::TestCoverage | RiskFactor::ReviewStatus
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RiskFactor::SecurityChanges => "securityChanges",
            RiskFactor::DependencyChanges => "dependencyChanges",
            RiskFactor::ConfigChanges => "configChanges",
            RiskFactor::VulnFixes => "vulnFixes",
            RiskFactor::TestCoverage => "testCoverage",
            RiskFactor::CodeComplexity => "codeComplexity",
            RiskFactor::AuthorRisk => "authorRisk",
            RiskFactor::ReviewStatus => "reviewStatus",
        }
    }
}

/// Normalised factor scores, each in `[0, 10]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorScores {
    pub security_changes: f64,
    pub dependency_changes: f64,
    pub config_changes: f64,
    pub vuln_fixes: f64,
    pub test_coverage: f64,
    pub code_complexity: f64,
    pub author_risk: f64,
    pub review_status: f64,
}

impl FactorScores {
    pub fn get(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::SecurityChanges => self.security_changes,
            RiskFactor::DependencyChanges => self.dependency_changes,
            RiskFactor::ConfigChanges => self.config_changes,
            RiskFactor::VulnFixes => self.vuln_fixes,
            RiskFactor::TestCoverage => self.test_coverage,
            RiskFactor::CodeComplexity => self.code_complexity,
            RiskFactor::AuthorRisk => self.author_risk,
            RiskFactor::ReviewStatus => self.review_status,
        }
    }

    pub fn set(&mut self, factor: RiskFactor, value: f64) {
        let slot = match factor {
            RiskFactor::SecurityChanges => &mut self.security_changes,
            RiskFactor::DependencyChanges => &mut self.dependency_changes,
            RiskFactor::ConfigChanges => &mut self.config_changes,
            RiskFactor::VulnFixes => &mut self.vuln_fixes,
            RiskFactor::TestCoverage => &mut self.test_coverage,
            RiskFactor::CodeComplexity => &mut self.code_complexity,
            RiskFactor::AuthorRisk => &mut self.author_risk,
            RiskFactor::ReviewStatus => &mut self.review_status,
        };
        *slot = value;
    }
}

/// Weight table applied to [`FactorScores`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskWeights {
    pub security_changes: f64,
    pub dependency_changes: f64,
    pub config_changes: f64,
    pub vuln_fixes: f64,
    pub test_coverage: f64,
    pub code_complexity: f64,
    pub author_risk: f64,
    pub review_status: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            security_changes: 0.35,
            dependency_changes: 0.2,
            config_changes: 0.15,
            vuln_fixes: -0.1,
            test_coverage: -0.1,
            code_complexity: 0.1,
            author_risk: 0.15,
            review_status: -0.15,
        }
    }
}

impl RiskWeights {
    pub fn get(&self, factor: RiskFactor) -> f64 {
        match factor {
            RiskFactor::SecurityChanges => self.security_changes,
            RiskFactor::DependencyChanges => self.dependency_changes,
            RiskFactor::ConfigChanges => self.config_changes,
            RiskFactor::VulnFixes => self.vuln_fixes,
            RiskFactor::TestCoverage => self.test_coverage,
            RiskFactor::CodeComplexity => self.code_complexity,
            RiskFactor::AuthorRisk => self.author_risk,
            RiskFactor::ReviewStatus => self.review_status,
        }
    }

    /// Risk-raising weights must be non-negative, risk-reducing ones non-positive
    pub fn validate(&self) -> Result<(), SecurityGateError> {
        for factor in RiskFactor::ALL {
            let weight = self.get(factor);
            let wrong_sign = if factor.reduces_risk() {
                weight > 0.0
            } else {
                weight < 0.0
            };
            if wrong_sign || !weight.is_finite() {
                return Err(SecurityGateError::invalid_weight(factor.name(), weight));
            }
        }
        Ok(())
    }
}

/// Result of scoring one change set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub factors: RiskFactors,
    pub recommendation: String,
}

/// Stateless scorer over a fixed weight table
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Weighted sum of the factor scores, clamped to `[0, 10]`
    pub fn score(&self, scores: &FactorScores) -> f64 {
        let raw: f64 = RiskFactor::ALL
            .iter()
            .map(|factor| scores.get(*factor).clamp(0.0, MAX_RISK_SCORE) * self.weights.get(*factor))
            .sum();

        if raw.is_nan() {
            return 0.0;
        }
        raw.clamp(0.0, MAX_RISK_SCORE)
    }

    pub fn level(&self, score: f64) -> RiskLevel {
        RiskLevel::from_score(score)
    }

    pub fn assess(&self, factors: &RiskFactors) -> RiskAssessment {
        let score = self.score(&factors.scores());
        let level = self.level(score);

        RiskAssessment {
            score,
            level,
            factors: factors.clone(),
            recommendation: level.recommendation().to_string(),
        }
    }
}
