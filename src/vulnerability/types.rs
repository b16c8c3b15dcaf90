use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    /// Lenient parse of scanner severity labels
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "moderate" | "medium" => Severity::Moderate,
            _ => Severity::Low,
        }
    }

    /// Map a CVSS base score onto the severity bands
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    pub fn is_high_or_critical(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent scanner families queried each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerFamily {
    Npm,
    Cargo,
    Secrets,
}

impl ScannerFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ScannerFamily::Npm => "npm",
            ScannerFamily::Cargo => "cargo",
            ScannerFamily::Secrets => "secrets",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "npm" => Some(ScannerFamily::Npm),
            "cargo" => Some(ScannerFamily::Cargo),
            "secrets" | "secret" => Some(ScannerFamily::Secrets),
            _ => None,
        }
    }
}

impl fmt::Display for ScannerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VulnerabilitySource {
    Dependency,
    Secret,
}

/// Identity of a finding, stable across scan cycles.
///
/// Dependencies: `<family>:<package>:<advisory>`.
/// Secrets: `secrets:<file>:<line>:<type>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VulnerabilityId(String);

impl VulnerabilityId {
    pub fn dependency(family: ScannerFamily, package: &str, advisory: &str) -> Self {
        Self(format!("{}:{}:{}", family.name(), package, advisory))
    }

    pub fn secret(file: &str, line: u32, secret_type: &str) -> Self {
        Self(format!("{}:{}:{}:{}", ScannerFamily::Secrets.name(), file, line, secret_type))
    }

    /// Rebuild an identifier parsed back out of an issue title
    pub fn parse(value: &str) -> Option<Self> {
        let family = value.split(':').next()?;
        ScannerFamily::from_name(family)?;
        if value.split(':').count() < 3 {
            return None;
        }
        Some(Self(value.to_string()))
    }

    pub fn family(&self) -> Option<ScannerFamily> {
        self.0.split(':').next().and_then(ScannerFamily::from_name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VulnerabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalised finding from any scanner family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: VulnerabilityId,
    pub severity: Severity,
    pub fix_available: bool,
    pub source: VulnerabilitySource,
    pub family: ScannerFamily,
    /// Package name, or `file:line` for secrets
    pub location: String,
    pub advisory: Option<String>,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub moderate: u32,
    pub low: u32,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Moderate => self.moderate += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.moderate + self.low
    }
}

/// One advisory reported by a dependency audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyItem {
    pub package: String,
    pub advisory: String,
    pub severity: Severity,
    pub fix_available: bool,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyAudit {
    pub total: u32,
    pub by_severity: SeverityCounts,
    pub items: Vec<DependencyItem>,
}

/// Secret scanner hit; the secret value itself is never carried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFinding {
    pub file: String,
    pub line: u32,
    pub secret_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "data")]
pub enum ScanFindings {
    Dependencies(DependencyAudit),
    Secrets(Vec<SecretFinding>),
}

impl ScanFindings {
    /// Safe default used when a scanner family fails
    pub fn empty_for(family: ScannerFamily) -> Self {
        match family {
            ScannerFamily::Secrets => ScanFindings::Secrets(Vec::new()),
            _ => ScanFindings::Dependencies(DependencyAudit::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub family: ScannerFamily,
    pub findings: ScanFindings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_round_trip_through_title_text() {
        let id = VulnerabilityId::dependency(ScannerFamily::Npm, "lodash", "GHSA-p6mc-m468-83gw");
        assert_eq!(id.as_str(), "npm:lodash:GHSA-p6mc-m468-83gw");
        assert_eq!(VulnerabilityId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.family(), Some(ScannerFamily::Npm));

        let secret = VulnerabilityId::secret("config/app.yml", 12, "aws-access-token");
        assert_eq!(secret.family(), Some(ScannerFamily::Secrets));
        assert_eq!(VulnerabilityId::parse("pip:thing"), None);
        assert_eq!(VulnerabilityId::parse("npm:only"), None);
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!(Severity::parse("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse("medium"), Severity::Moderate);
        assert_eq!(Severity::parse("info"), Severity::Low);
        assert_eq!(Severity::from_cvss(9.8), Severity::Critical);
        assert_eq!(Severity::from_cvss(7.5), Severity::High);
        assert_eq!(Severity::from_cvss(5.0), Severity::Moderate);
    }

    #[test]
    fn test_severity_counts() {
        let mut counts = SeverityCounts::default();
        counts.add(Severity::Critical);
        counts.add(Severity::Low);
        counts.add(Severity::Low);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.low, 2);
    }
}
