//! Flattening of per-family scan reports into identifier-keyed findings

use std::collections::BTreeMap;

use crate::vulnerability::types::*;

/// Merge every report into one list keyed by [`VulnerabilityId`].
///
/// Duplicate identifiers (the same advisory reported twice for a package)
/// collapse into one record carrying the highest severity seen. A fix counts
/// as available if any occurrence reports one. Output is sorted by id.
pub fn normalize(reports: &[ScanReport]) -> Vec<Vulnerability> {
    let mut merged: BTreeMap<VulnerabilityId, Vulnerability> = BTreeMap::new();

    for report in reports {
        for vulnerability in flatten(report) {
            match merged.get_mut(&vulnerability.id) {
                Some(existing) => {
                    existing.severity = existing.severity.max(vulnerability.severity);
                    existing.fix_available |= vulnerability.fix_available;
                    if existing.published_at.is_none() {
                        existing.published_at = vulnerability.published_at;
                    }
                }
                None => {
                    merged.insert(vulnerability.id.clone(), vulnerability);
                }
            }
        }
    }

    merged.into_values().collect()
}

fn flatten(report: &ScanReport) -> Vec<Vulnerability> {
    match &report.findings {
        ScanFindings::Dependencies(audit) => audit
            .items
            .iter()
            .map(|item| Vulnerability {
                id: VulnerabilityId::dependency(report.family, &item.package, &item.advisory),
                severity: item.severity,
                fix_available: item.fix_available,
                source: VulnerabilitySource::Dependency,
                family: report.family,
                location: item.package.clone(),
                advisory: Some(item.advisory.clone()),
                title: item.title.clone(),
                published_at: item.published_at,
            })
            .collect(),
        // A leaked secret has no update action; it always needs a human.
        ScanFindings::Secrets(findings) => findings
            .iter()
            .map(|finding| Vulnerability {
                id: VulnerabilityId::secret(&finding.file, finding.line, &finding.secret_type),
                severity: Severity::Critical,
                fix_available: false,
                source: VulnerabilitySource::Secret,
                family: ScannerFamily::Secrets,
                location: format!("{}:{}", finding.file, finding.line),
                advisory: None,
                title: format!("Potential {} committed to {}", finding.secret_type, finding.file),
                published_at: None,
            })
            .collect(),
    }
}
