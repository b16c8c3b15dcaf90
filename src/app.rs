//! Wiring shared by the server and the command-line tools

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::audit::AuditLogger;
use crate::config::{AppConfig, SecurityPolicy};
use crate::enforcement::{DecisionLogger, MergeOrchestrator};
use crate::github::{DryRunVcs, GitHubClient, VcsClient};
use crate::metrics::{AlertEngine, MetricsStore};
use crate::notify::{LogNotifier, Notifier, SlackNotifier};
use crate::vulnerability::{
    CargoAuditScanner, GitleaksScanner, NpmAuditScanner, ScannerSet, VulnerabilityReconciler,
    VulnerabilityScanner,
};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "security_gate_app=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn load_policy(config: &AppConfig) -> Result<Arc<SecurityPolicy>> {
    let policy = SecurityPolicy::load_from_file(Path::new(&config.policy_path))
        .with_context(|| format!("Invalid security policy {}", config.policy_path))?;
    Ok(Arc::new(policy))
}

/// Scanners for whichever ecosystems the working directory contains.
/// The secret scanner always runs.
pub fn scanner_set(config: &AppConfig, policy: &SecurityPolicy) -> ScannerSet {
    let workdir = PathBuf::from(&config.scan_workdir);
    let mut scanners: Vec<Arc<dyn VulnerabilityScanner>> = Vec::new();

    if workdir.join("package.json").exists() {
        scanners.push(Arc::new(NpmAuditScanner::new(workdir.clone())));
    }
    if workdir.join("Cargo.lock").exists() {
        scanners.push(Arc::new(CargoAuditScanner::new(workdir.clone())));
    }
    scanners.push(Arc::new(GitleaksScanner::new(workdir)));

    let set = ScannerSet::new(scanners, policy.external_timeout());
    info!("Configured scanners: {:?}", set.families());
    set
}

pub fn notifiers(config: &AppConfig) -> Vec<Arc<dyn Notifier>> {
    match &config.slack_webhook_url {
        Some(url) => vec![Arc::new(SlackNotifier::new(url.clone()))],
        None => vec![Arc::new(LogNotifier)],
    }
}

/// GitHub client, wrapped so that nothing is written in dry-run mode
pub fn vcs_client(config: &AppConfig) -> Result<Arc<dyn VcsClient>> {
    let client: Arc<dyn VcsClient> = Arc::new(GitHubClient::new(config.github_token.clone())?);
    if config.dry_run_mode {
        info!("Dry-run mode: host writes are logged, not performed");
        Ok(Arc::new(DryRunVcs::new(client)))
    } else {
        Ok(client)
    }
}

pub struct Services {
    pub policy: Arc<SecurityPolicy>,
    pub vcs: Arc<dyn VcsClient>,
    pub metrics: Arc<MetricsStore>,
    pub orchestrator: Arc<MergeOrchestrator>,
    pub reconciler: Arc<VulnerabilityReconciler>,
}

pub fn build_services(config: &AppConfig) -> Result<Services> {
    config.repository_parts()?;
    let policy = load_policy(config)?;
    let vcs = vcs_client(config)?;
    let scanners = scanner_set(config, &policy);
    let notifiers = notifiers(config);

    let metrics = Arc::new(
        MetricsStore::open(&config.metrics_dir)
            .with_context(|| format!("Failed to open metrics dir {}", config.metrics_dir))?,
    );
    let alerts = Arc::new(AlertEngine::new(
        policy.alert_thresholds.clone(),
        policy.alert_cooldown(),
        notifiers.clone(),
        policy.notification_channels.clone(),
        policy.external_timeout(),
    ));

    let audit = AuditLogger::open(&config.audit_log_path, config.server_id.clone())?;
    info!("Audit trail at {:?}", audit.path());

    let orchestrator = MergeOrchestrator::new(
        policy.clone(),
        scanners.clone(),
        vcs.clone(),
        notifiers,
        metrics.clone(),
    )?
    .with_audit(audit)
    .with_decision_log(DecisionLogger::new(
        config.dry_run_mode,
        config.decision_log_path.clone(),
    ));

    let reconciler = VulnerabilityReconciler::new(
        config.github_repository.clone(),
        policy.clone(),
        scanners,
        vcs.clone(),
        metrics.clone(),
        alerts,
    );

    Ok(Services {
        policy,
        vcs,
        metrics,
        orchestrator: Arc::new(orchestrator),
        reconciler: Arc::new(reconciler),
    })
}
