//! Identifier-keyed reconciliation of tracking issues
//!
//! The issue title carries the vulnerability identifier, so the open-issue
//! set on the host is the only ledger: `[security] <id>` for standard issues
//! and `[security][manual-review] <id>` for findings without a fix.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use crate::external;
use crate::github::{NewIssue, TrackedIssue, VcsClient};
use crate::vulnerability::types::{ScannerFamily, Vulnerability, VulnerabilityId};

pub const VULNERABILITY_LABEL: &str = "security-vulnerability";
pub const MANUAL_REVIEW_LABEL: &str = "manual-review-required";
pub const FALSE_POSITIVE_LABEL: &str = "false-positive";

const STANDARD_PREFIX: &str = "[security] ";
const MANUAL_REVIEW_PREFIX: &str = "[security][manual-review] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueKind {
    Standard,
    ManualReview,
}

pub fn issue_title(kind: IssueKind, id: &VulnerabilityId) -> String {
    match kind {
        IssueKind::Standard => format!("{}{}", STANDARD_PREFIX, id),
        IssueKind::ManualReview => format!("{}{}", MANUAL_REVIEW_PREFIX, id),
    }
}

/// Recover kind and identifier from an issue title
pub fn parse_title(title: &str) -> Option<(IssueKind, VulnerabilityId)> {
    let (kind, rest) = if let Some(rest) = title.strip_prefix(MANUAL_REVIEW_PREFIX) {
        (IssueKind::ManualReview, rest)
    } else if let Some(rest) = title.strip_prefix(STANDARD_PREFIX) {
        (IssueKind::Standard, rest)
    } else {
        return None;
    };
    VulnerabilityId::parse(rest.trim()).map(|id| (kind, id))
}

fn classify(vulnerability: &Vulnerability) -> Option<IssueKind> {
    if !vulnerability.fix_available {
        Some(IssueKind::ManualReview)
    } else if vulnerability.severity.is_high_or_critical() {
        Some(IssueKind::Standard)
    } else {
        None
    }
}

pub fn new_issue(kind: IssueKind, vulnerability: &Vulnerability) -> NewIssue {
    let mut labels = vec![VULNERABILITY_LABEL.to_string()];
    if kind == IssueKind::ManualReview {
        labels.push(MANUAL_REVIEW_LABEL.to_string());
    }

    let remediation = match kind {
        IssueKind::Standard => "An automatic fix was attempted once and did not resolve this finding. A maintainer must remediate it; this issue closes once the finding disappears from the scan results.",
        IssueKind::ManualReview => "No automatic fix is available. A maintainer must remediate this finding and close the issue by hand.",
    };

    let body = format!(
        "## {}\n\n\
         | Field | Value |\n\
         |---|---|\n\
         | Identifier | `{}` |\n\
         | Severity | {} |\n\
         | Source | {:?} |\n\
         | Location | `{}` |\n\
         | Advisory | {} |\n\
         | Fix available | {} |\n\n\
         {}\n",
        vulnerability.title,
        vulnerability.id,
        vulnerability.severity,
        vulnerability.source,
        vulnerability.location,
        vulnerability.advisory.as_deref().unwrap_or("n/a"),
        if vulnerability.fix_available { "yes" } else { "no" },
        remediation,
    );

    NewIssue {
        title: issue_title(kind, &vulnerability.id),
        body,
        labels,
    }
}

pub fn resolution_note(id: &VulnerabilityId) -> String {
    format!(
        "Resolved: `{}` is no longer reported by the latest security scan. Closing automatically.",
        id
    )
}

pub fn superseded_note(id: &VulnerabilityId, replacement: u64) -> String {
    format!(
        "Superseded by #{}: `{}` no longer has an automatic fix and now needs manual review.",
        replacement, id
    )
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub create: Vec<(IssueKind, Vulnerability)>,
    pub close: Vec<(TrackedIssue, VulnerabilityId)>,
    /// Standard issues whose finding lost its fix, replaced by a
    /// manual-review issue
    pub supersede: Vec<(TrackedIssue, Vulnerability)>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.close.is_empty() && self.supersede.is_empty()
    }
}

/// Decide which issues to open and close.
///
/// An identifier with any open issue never gets a second one. A standard
/// issue whose finding became unfixable is superseded by a manual-review
/// issue; a manual-review issue stays as it is when a fix appears.
/// Manual-review issues are never closed here. Standard issues whose family
/// failed to scan this cycle are left alone.
pub fn plan(
    findings: &[Vulnerability],
    open_issues: &[TrackedIssue],
    failed_families: &[ScannerFamily],
) -> ReconcilePlan {
    let mut tracked: HashMap<VulnerabilityId, (IssueKind, &TrackedIssue)> = HashMap::new();
    for issue in open_issues {
        if let Some((kind, id)) = parse_title(&issue.title) {
            // a manual-review issue wins over a stale standard one
            let keep_existing = matches!(tracked.get(&id), Some((IssueKind::ManualReview, _)));
            if !keep_existing {
                tracked.insert(id, (kind, issue));
            }
        }
    }

    let current: HashSet<&VulnerabilityId> = findings.iter().map(|v| &v.id).collect();
    let mut result = ReconcilePlan::default();
    let mut planned: BTreeSet<VulnerabilityId> = BTreeSet::new();

    for vulnerability in findings {
        let Some(kind) = classify(vulnerability) else {
            continue;
        };
        if !planned.insert(vulnerability.id.clone()) {
            continue;
        }
        match tracked.get(&vulnerability.id) {
            None => result.create.push((kind, vulnerability.clone())),
            Some((IssueKind::Standard, issue)) if kind == IssueKind::ManualReview => {
                info!(
                    "{} lost its automatic fix, replacing issue #{} with a manual-review issue",
                    vulnerability.id, issue.number
                );
                result.supersede.push(((*issue).clone(), vulnerability.clone()));
            }
            Some(_) => {}
        }
    }

    for issue in open_issues {
        let Some((IssueKind::Standard, id)) = parse_title(&issue.title) else {
            continue;
        };
        if current.contains(&id) {
            continue;
        }
        if id.family().map_or(false, |f| failed_families.contains(&f)) {
            info!("Keeping issue #{} open: {} scanner failed this cycle", issue.number, id);
            continue;
        }
        result.close.push((issue.clone(), id));
    }

    result
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub opened: Vec<TrackedIssue>,
    pub manual_review_opened: Vec<TrackedIssue>,
    pub closed: Vec<(TrackedIssue, VulnerabilityId)>,
    pub superseded: Vec<TrackedIssue>,
    pub errors: Vec<String>,
}

/// Apply a plan. Each write is independent; a failed write is reported and
/// retried naturally by the next cycle since the plan is recomputed.
pub async fn apply_plan(
    vcs: &dyn VcsClient,
    repo: &str,
    plan: ReconcilePlan,
    timeout: Duration,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for (kind, vulnerability) in plan.create {
        let issue = new_issue(kind, &vulnerability);
        match external::call("vcs", timeout, vcs.create_issue(repo, issue)).await {
            Ok(issue) => {
                info!("Opened issue #{} for {}", issue.number, vulnerability.id);
                match kind {
                    IssueKind::Standard => outcome.opened.push(issue),
                    IssueKind::ManualReview => outcome.manual_review_opened.push(issue),
                }
            }
            Err(e) => {
                warn!("Failed to open issue for {}: {}", vulnerability.id, e);
                outcome.errors.push(e.to_string());
            }
        }
    }

    for (old, vulnerability) in plan.supersede {
        let issue = new_issue(IssueKind::ManualReview, &vulnerability);
        let replacement = match external::call("vcs", timeout, vcs.create_issue(repo, issue)).await {
            Ok(replacement) => replacement,
            Err(e) => {
                // the old issue stays open so the identifier remains tracked
                warn!("Failed to open manual-review issue for {}: {}", vulnerability.id, e);
                outcome.errors.push(e.to_string());
                continue;
            }
        };

        let note = superseded_note(&vulnerability.id, replacement.number);
        info!("Opened manual-review issue #{} for {}", replacement.number, vulnerability.id);
        outcome.manual_review_opened.push(replacement);
        match external::call("vcs", timeout, vcs.close_issue(repo, old.number, &note)).await {
            Ok(()) => outcome.superseded.push(old),
            Err(e) => {
                warn!("Failed to close superseded issue #{}: {}", old.number, e);
                outcome.errors.push(e.to_string());
            }
        }
    }

    for (issue, id) in plan.close {
        let note = resolution_note(&id);
        match external::call("vcs", timeout, vcs.close_issue(repo, issue.number, &note)).await {
            Ok(()) => {
                info!("Closed issue #{} for resolved {}", issue.number, id);
                outcome.closed.push((issue, id));
            }
            Err(e) => {
                warn!("Failed to close issue #{}: {}", issue.number, e);
                outcome.errors.push(e.to_string());
            }
        }
    }

    outcome
}
