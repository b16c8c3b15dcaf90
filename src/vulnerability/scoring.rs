//! Severity-weighted risk of the repository's open findings

use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::vulnerability::types::{Severity, SeverityCounts, Vulnerability, VulnerabilitySource};

const CRITICAL_WEIGHT: f64 = 10.0;
const HIGH_WEIGHT: f64 = 5.0;
const MODERATE_WEIGHT: f64 = 2.0;
const LOW_WEIGHT: f64 = 1.0;
const SECRET_WEIGHT: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityScore {
    /// Unbounded weighted sum
    pub score: f64,
    pub level: RiskLevel,
    pub counts: SeverityCounts,
    pub secrets: u32,
}

fn weight(vulnerability: &Vulnerability) -> f64 {
    if vulnerability.source == VulnerabilitySource::Secret {
        return SECRET_WEIGHT;
    }
    match vulnerability.severity {
        Severity::Critical => CRITICAL_WEIGHT,
        Severity::High => HIGH_WEIGHT,
        Severity::Moderate => MODERATE_WEIGHT,
        Severity::Low => LOW_WEIGHT,
    }
}

/// Score the findings of one cycle. Secrets are weighted on their own and
/// are counted separately from dependency severities.
pub fn score(vulnerabilities: &[Vulnerability]) -> VulnerabilityScore {
    let mut counts = SeverityCounts::default();
    let mut secrets = 0;

    for vulnerability in vulnerabilities {
        match vulnerability.source {
            VulnerabilitySource::Secret => secrets += 1,
            VulnerabilitySource::Dependency => counts.add(vulnerability.severity),
        }
    }

    let score: f64 = vulnerabilities.iter().map(weight).sum();

    VulnerabilityScore {
        score,
        level: RiskLevel::from_score(score),
        counts,
        secrets,
    }
}
