//! Process-backed scanner adapters
//!
//! `npm audit`, `cargo audit` and `gitleaks` run as child processes in the
//! repository checkout; their JSON output is parsed by the pure functions
//! below. Audit tools exit non-zero when they find something, so stdout is
//! parsed regardless of the exit status.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SecurityGateError};
use crate::vulnerability::scanner::VulnerabilityScanner;
use crate::vulnerability::types::*;

async fn run_tool(program: &str, args: &[&str], workdir: &PathBuf) -> Result<(bool, String)> {
    debug!("Running {} {:?} in {:?}", program, args, workdir);
    let output = Command::new(program)
        .args(args)
        .current_dir(workdir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SecurityGateError::ScannerError(format!("Failed to run {}: {}", program, e)))?;

    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
    ))
}

fn require_output(program: &str, stdout: &str) -> Result<()> {
    if stdout.trim().is_empty() {
        return Err(SecurityGateError::ScannerError(format!(
            "{} produced no output",
            program
        )));
    }
    Ok(())
}

pub struct NpmAuditScanner {
    workdir: PathBuf,
}

impl NpmAuditScanner {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl VulnerabilityScanner for NpmAuditScanner {
    fn family(&self) -> ScannerFamily {
        ScannerFamily::Npm
    }

    async fn scan(&self) -> Result<ScanFindings> {
        let (_, stdout) = run_tool("npm", &["audit", "--json"], &self.workdir).await?;
        require_output("npm audit", &stdout)?;
        Ok(ScanFindings::Dependencies(parse_npm_audit(&stdout)?))
    }

    async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()> {
        info!("Updating npm package {}", vulnerability.location);
        let (ok, _) = run_tool("npm", &["update", &vulnerability.location], &self.workdir).await?;
        if !ok {
            return Err(SecurityGateError::ScannerError(format!(
                "npm update {} failed",
                vulnerability.location
            )));
        }
        Ok(())
    }
}

pub struct CargoAuditScanner {
    workdir: PathBuf,
}

impl CargoAuditScanner {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl VulnerabilityScanner for CargoAuditScanner {
    fn family(&self) -> ScannerFamily {
        ScannerFamily::Cargo
    }

    async fn scan(&self) -> Result<ScanFindings> {
        let (_, stdout) = run_tool("cargo", &["audit", "--json"], &self.workdir).await?;
        require_output("cargo audit", &stdout)?;
        Ok(ScanFindings::Dependencies(parse_cargo_audit(&stdout)?))
    }

    async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()> {
        info!("Updating cargo package {}", vulnerability.location);
        let (ok, _) = run_tool(
            "cargo",
            &["update", "-p", &vulnerability.location],
            &self.workdir,
        )
        .await?;
        if !ok {
            return Err(SecurityGateError::ScannerError(format!(
                "cargo update -p {} failed",
                vulnerability.location
            )));
        }
        Ok(())
    }
}

pub struct GitleaksScanner {
    workdir: PathBuf,
}

impl GitleaksScanner {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

#[async_trait]
impl VulnerabilityScanner for GitleaksScanner {
    fn family(&self) -> ScannerFamily {
        ScannerFamily::Secrets
    }

    async fn scan(&self) -> Result<ScanFindings> {
        let (_, stdout) = run_tool(
            "gitleaks",
            &[
                "detect",
                "--no-banner",
                "--redact",
                "--report-format",
                "json",
                "--report-path",
                "/dev/stdout",
            ],
            &self.workdir,
        )
        .await?;
        if stdout.trim().is_empty() {
            return Ok(ScanFindings::Secrets(Vec::new()));
        }
        Ok(ScanFindings::Secrets(parse_gitleaks(&stdout)?))
    }

    async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()> {
        Err(SecurityGateError::ScannerError(format!(
            "Leaked secrets cannot be fixed automatically: {}",
            vulnerability.id
        )))
    }
}

fn parse_json(tool: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| SecurityGateError::ScannerError(format!("Malformed {} output: {}", tool, e)))
}

/// Parse `npm audit --json` (report version 2).
///
/// Packages whose `via` entries are all plain strings are only affected
/// through another listed package and are not reported separately.
pub fn parse_npm_audit(raw: &str) -> Result<DependencyAudit> {
    let json = parse_json("npm audit", raw)?;
    let mut audit = DependencyAudit::default();

    if let Some(vulnerabilities) = json.get("vulnerabilities").and_then(|v| v.as_object()) {
        for (package, entry) in vulnerabilities {
            let fix_available = match entry.get("fixAvailable") {
                Some(Value::Bool(b)) => *b,
                Some(Value::Object(_)) => true,
                _ => false,
            };

            let advisories = entry
                .get("via")
                .and_then(|v| v.as_array())
                .map(|via| via.iter().filter(|v| v.is_object()).collect::<Vec<_>>())
                .unwrap_or_default();

            for advisory in advisories {
                let id = advisory
                    .get("url")
                    .and_then(|u| u.as_str())
                    .and_then(|u| u.rsplit('/').next())
                    .map(|s| s.to_string())
                    .or_else(|| advisory.get("source").map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown".to_string());

                let severity = advisory
                    .get("severity")
                    .or_else(|| entry.get("severity"))
                    .and_then(|s| s.as_str())
                    .map(Severity::parse)
                    .unwrap_or(Severity::Low);

                audit.by_severity.add(severity);
                audit.items.push(DependencyItem {
                    package: package.clone(),
                    advisory: id,
                    severity,
                    fix_available,
                    title: advisory
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or("npm advisory")
                        .to_string(),
                    published_at: None,
                });
            }
        }
    }

    audit.total = audit.items.len() as u32;
    Ok(audit)
}

/// Parse `cargo audit --json`.
///
/// RustSec advisories carry a CVSS vector rather than a severity; severity is
/// derived from network reachability and the number of high impacts.
pub fn parse_cargo_audit(raw: &str) -> Result<DependencyAudit> {
    let json = parse_json("cargo audit", raw)?;
    let mut audit = DependencyAudit::default();

    let list = json
        .get("vulnerabilities")
        .and_then(|v| v.get("list"))
        .and_then(|l| l.as_array())
        .cloned()
        .unwrap_or_default();

    for entry in list {
        let advisory = entry.get("advisory").cloned().unwrap_or(Value::Null);
        let package = entry
            .get("package")
            .and_then(|p| p.get("name"))
            .or_else(|| advisory.get("package"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        let severity = severity_from_cvss_vector(advisory.get("cvss").and_then(|c| c.as_str()));
        let fix_available = entry
            .get("versions")
            .and_then(|v| v.get("patched"))
            .and_then(|p| p.as_array())
            .map(|p| !p.is_empty())
            .unwrap_or(false);

        let published_at = advisory
            .get("date")
            .and_then(|d| d.as_str())
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));

        audit.by_severity.add(severity);
        audit.items.push(DependencyItem {
            package,
            advisory: advisory
                .get("id")
                .and_then(|i| i.as_str())
                .unwrap_or("unknown")
                .to_string(),
            severity,
            fix_available,
            title: advisory
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("RustSec advisory")
                .to_string(),
            published_at,
        });
    }

    audit.total = audit.items.len() as u32;
    Ok(audit)
}

fn severity_from_cvss_vector(vector: Option<&str>) -> Severity {
    let Some(vector) = vector else {
        return Severity::Moderate;
    };

    let network = vector.contains("AV:N");
    let high_impacts = ["C:H", "I:H", "A:H"]
        .iter()
        .filter(|metric| vector.split('/').any(|part| part == **metric))
        .count();

    match (network, high_impacts) {
        (true, n) if n >= 2 => Severity::Critical,
        (true, 1) | (false, 3) => Severity::High,
        (_, 0) => Severity::Low,
        _ => Severity::Moderate,
    }
}

/// Parse a gitleaks JSON report, keeping only location and rule
pub fn parse_gitleaks(raw: &str) -> Result<Vec<SecretFinding>> {
    let json = parse_json("gitleaks", raw)?;
    let entries = json.as_array().cloned().unwrap_or_default();

    Ok(entries
        .iter()
        .map(|entry| SecretFinding {
            file: entry
                .get("File")
                .and_then(|f| f.as_str())
                .unwrap_or("unknown")
                .to_string(),
            line: entry
                .get("StartLine")
                .and_then(|l| l.as_u64())
                .unwrap_or(0) as u32,
            secret_type: entry
                .get("RuleID")
                .and_then(|r| r.as_str())
                .unwrap_or("generic-secret")
                .to_string(),
        })
        .collect())
}
