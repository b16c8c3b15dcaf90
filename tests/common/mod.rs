#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use security_gate_app::analysis::{
    Author, AuthorAssociation, ChangeSet, CheckConclusion, CheckResult, Review, ReviewState,
};
use security_gate_app::config::{AlertThresholds, SecurityPolicy};
use security_gate_app::enforcement::MergeOrchestrator;
use security_gate_app::error::{Result, SecurityGateError};
use security_gate_app::github::InMemoryVcs;
use security_gate_app::metrics::{AlertEngine, MetricsStore};
use security_gate_app::notify::Notifier;
use security_gate_app::vulnerability::types::{
    DependencyAudit, DependencyItem, SecretFinding, SeverityCounts,
};
use security_gate_app::vulnerability::{
    ScanFindings, ScannerFamily, ScannerSet, Severity, Vulnerability, VulnerabilityReconciler,
    VulnerabilityScanner,
};

pub const REPO: &str = "acme/app";

/// Scripted scanner. Applying a fix removes the package from later scans
/// when `fix_resolves` is set.
pub struct FakeScanner {
    family: ScannerFamily,
    items: Mutex<Vec<DependencyItem>>,
    secrets: Mutex<Vec<SecretFinding>>,
    failing: AtomicBool,
    fix_resolves: AtomicBool,
    scan_delay: Mutex<Option<Duration>>,
    pub scans: AtomicUsize,
    pub fixes: Mutex<Vec<String>>,
}

impl FakeScanner {
    pub fn new(family: ScannerFamily) -> Arc<Self> {
        Arc::new(Self {
            family,
            items: Mutex::new(Vec::new()),
            secrets: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fix_resolves: AtomicBool::new(false),
            scan_delay: Mutex::new(None),
            scans: AtomicUsize::new(0),
            fixes: Mutex::new(Vec::new()),
        })
    }

    pub fn set_items(&self, items: Vec<DependencyItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_secrets(&self, secrets: Vec<SecretFinding>) {
        *self.secrets.lock().unwrap() = secrets;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_fix_resolves(&self, resolves: bool) {
        self.fix_resolves.store(resolves, Ordering::SeqCst);
    }

    pub fn set_scan_delay(&self, delay: Option<Duration>) {
        *self.scan_delay.lock().unwrap() = delay;
    }

    pub fn fix_attempts(&self) -> usize {
        self.fixes.lock().unwrap().len()
    }
}

#[async_trait]
impl VulnerabilityScanner for FakeScanner {
    fn family(&self) -> ScannerFamily {
        self.family
    }

    async fn scan(&self) -> Result<ScanFindings> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SecurityGateError::ScannerError(format!(
                "{} unavailable",
                self.family
            )));
        }

        if self.family == ScannerFamily::Secrets {
            return Ok(ScanFindings::Secrets(self.secrets.lock().unwrap().clone()));
        }

        let items = self.items.lock().unwrap().clone();
        let mut by_severity = SeverityCounts::default();
        for item in &items {
            by_severity.add(item.severity);
        }
        Ok(ScanFindings::Dependencies(DependencyAudit {
            total: items.len() as u32,
            by_severity,
            items,
        }))
    }

    async fn apply_fix(&self, vulnerability: &Vulnerability) -> Result<()> {
        self.fixes.lock().unwrap().push(vulnerability.location.clone());
        if self.fix_resolves.load(Ordering::SeqCst) {
            self.items
                .lock()
                .unwrap()
                .retain(|i| i.package != vulnerability.location);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &str, channel: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

pub fn dependency(package: &str, advisory: &str, severity: Severity, fix_available: bool) -> DependencyItem {
    DependencyItem {
        package: package.to_string(),
        advisory: advisory.to_string(),
        severity,
        fix_available,
        title: format!("{} in {}", advisory, package),
        published_at: None,
    }
}

/// Thresholds that never fire
pub fn quiet_thresholds() -> AlertThresholds {
    AlertThresholds {
        mttr: f64::MAX,
        mttd: f64::MAX,
        critical_issues: f64::MAX,
        high_issues: f64::MAX,
        false_positive_rate: f64::MAX,
    }
}

pub fn test_policy() -> SecurityPolicy {
    SecurityPolicy {
        security_team: vec!["sec-lead".to_string()],
        alert_thresholds: quiet_thresholds(),
        external_call_timeout_ms: 2_000,
        ..SecurityPolicy::default()
    }
}

pub struct ReconcilerHarness {
    pub vcs: Arc<InMemoryVcs>,
    pub npm: Arc<FakeScanner>,
    pub secrets: Arc<FakeScanner>,
    pub metrics: Arc<MetricsStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub reconciler: Arc<VulnerabilityReconciler>,
}

pub fn reconciler_harness(policy: SecurityPolicy) -> ReconcilerHarness {
    let policy = Arc::new(policy);
    let vcs = Arc::new(InMemoryVcs::new());
    let npm = FakeScanner::new(ScannerFamily::Npm);
    let secrets = FakeScanner::new(ScannerFamily::Secrets);
    let metrics = Arc::new(MetricsStore::in_memory());
    let notifier = Arc::new(RecordingNotifier::default());

    let scanner_list: Vec<Arc<dyn VulnerabilityScanner>> = vec![npm.clone(), secrets.clone()];
    let scanners = ScannerSet::new(scanner_list, policy.external_timeout());
    let notifiers: Vec<Arc<dyn Notifier>> = vec![notifier.clone()];
    let alerts = Arc::new(AlertEngine::new(
        policy.alert_thresholds.clone(),
        policy.alert_cooldown(),
        notifiers,
        policy.notification_channels.clone(),
        policy.external_timeout(),
    ));
    let reconciler = Arc::new(VulnerabilityReconciler::new(
        REPO.to_string(),
        policy,
        scanners,
        vcs.clone(),
        metrics.clone(),
        alerts,
    ));

    ReconcilerHarness {
        vcs,
        npm,
        secrets,
        metrics,
        notifier,
        reconciler,
    }
}

/// Titles of the open issues, for comparing issue sets across cycles
pub fn open_titles(vcs: &InMemoryVcs) -> BTreeSet<String> {
    vcs.open_issues().into_iter().map(|i| i.title).collect()
}

pub fn file_diff(path: &str, added: &[&str]) -> String {
    let mut diff = format!(
        "diff --git a/{path} b/{path}\n--- a/{path}\n+++ b/{path}\n@@ -1 +1,{} @@\n",
        added.len() + 1,
        path = path
    );
    for line in added {
        diff.push('+');
        diff.push_str(line);
        diff.push('\n');
    }
    diff
}

pub fn passing_checks() -> Vec<CheckResult> {
    vec![
        CheckResult {
            name: "security".to_string(),
            conclusion: Some(CheckConclusion::Success),
        },
        CheckResult {
            name: "test".to_string(),
            conclusion: Some(CheckConclusion::Success),
        },
    ]
}

pub fn changeset(number: u64, diff: String) -> ChangeSet {
    ChangeSet {
        repo: REPO.to_string(),
        number,
        title: format!("Change {}", number),
        body: String::new(),
        author: Author {
            login: "dev".to_string(),
            association: AuthorAssociation::Member,
            is_bot: false,
        },
        head_sha: format!("head{}", number),
        base_sha: format!("base{}", number),
        diff,
        reviews: Vec::new(),
        checks: passing_checks(),
    }
}

pub fn approve(changeset: &mut ChangeSet, reviewer: &str) {
    changeset.reviews.push(Review {
        reviewer: reviewer.to_string(),
        state: ReviewState::Approved,
        submitted_at: None,
    });
}

pub fn readme_changeset(number: u64) -> ChangeSet {
    changeset(number, file_diff("README.md", &["More documentation"]))
}

/// `.env` change plus a dynamic code evaluation construct
pub fn env_eval_changeset(number: u64) -> ChangeSet {
    let diff = [
        file_diff(".env", &["FEATURE_FLAGS=beta"]),
        file_diff("src/loader.js", &["const run = eval(source);"]),
    ]
    .concat();
    changeset(number, diff)
}

/// New dependencies and plain config files from a first-time contributor;
/// no sensitive paths, so no approval gate
pub fn medium_changeset(number: u64) -> ChangeSet {
    let diff = [
        file_diff(
            "package.json",
            &[
                "\"left-pad\": \"^1.3.0\",",
                "\"chalk\": \"^5.0.0\",",
                "\"lodash\": \"^4.17.21\",",
                "\"axios\": \"^1.6.0\",",
                "\"dayjs\": \"^1.11.0\",",
            ],
        ),
        file_diff("config/app.yml", &["timeout: 30"]),
        file_diff("docker-compose.yml", &["image: app:latest"]),
    ]
    .concat();

    let mut cs = changeset(number, diff);
    cs.author.association = AuthorAssociation::FirstTimeContributor;
    cs
}

/// Sensitive paths, dangerous constructs, new dependencies, config files and
/// dense control flow from a first-time contributor
pub fn high_risk_changeset(number: u64) -> ChangeSet {
    let diff = [
        file_diff(
            "src/auth/session.js",
            &[
                "if (user && token) { eval(payload); }",
                "if (admin || debug) { el.innerHTML = html; }",
            ],
        ),
        file_diff(".env", &["# if set && enabled"]),
        file_diff("config/secrets.yml", &["# if prod || staging"]),
        file_diff(
            "package.json",
            &[
                "\"if-env\": \"^1.0.0\",",
                "\"loop-fn\": \"^2.0.0\",",
                "\"for-each\": \"^0.3.3\",",
                "\"while-x\": \"^1.1.0\",",
                "\"match-all\": \"^1.2.0\",",
            ],
        ),
    ]
    .concat();

    let mut cs = changeset(number, diff);
    cs.author.association = AuthorAssociation::FirstTimeContributor;
    cs
}

/// Orchestrator over an in-memory host with no repository scanners
pub fn orchestrator(policy: SecurityPolicy, vcs: Arc<InMemoryVcs>) -> (MergeOrchestrator, Arc<MetricsStore>) {
    let policy = Arc::new(policy);
    let metrics = Arc::new(MetricsStore::in_memory());
    let orchestrator = MergeOrchestrator::new(
        policy.clone(),
        ScannerSet::new(Vec::new(), policy.external_timeout()),
        vcs,
        Vec::new(),
        metrics.clone(),
    )
    .unwrap();
    (orchestrator, metrics)
}
