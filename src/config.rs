pub mod loader;

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::SecurityGateError;

pub use loader::{
    AlertThresholds, MergeMethod, MergeStrategy, SecurityGatesConfig, SecurityPolicy,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub github_token: String,
    pub github_repository: String,
    pub policy_path: String,
    pub server_host: String,
    pub server_port: u16,
    pub dry_run_mode: bool,
    pub metrics_dir: String,
    pub audit_log_path: String,
    pub decision_log_path: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub server_id: String,
    pub scan_workdir: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, SecurityGateError> {
        let github_token = env::var("GITHUB_TOKEN").unwrap_or_default();

        let github_repository = env::var("GITHUB_REPOSITORY")
            .unwrap_or_else(|_| "owner/repository".to_string());

        let policy_path = env::var("POLICY_PATH")
            .unwrap_or_else(|_| "config/security-policy.yml".to_string());

        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| SecurityGateError::ConfigError(format!("Invalid SERVER_PORT: {}", e)))?;

        let dry_run_mode = env::var("DRY_RUN")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let metrics_dir = env::var("METRICS_DIR")
            .unwrap_or_else(|_| "docs/security-reports".to_string());

        let audit_log_path = env::var("AUDIT_LOG_PATH")
            .unwrap_or_else(|_| "logs/audit.jsonl".to_string());

        let decision_log_path = env::var("DECISION_LOG_PATH").ok();
        let slack_webhook_url = env::var("SLACK_WEBHOOK_URL").ok().filter(|u| !u.is_empty());

        let server_id = env::var("SERVER_ID")
            .unwrap_or_else(|_| "security-gate-01".to_string());

        let scan_workdir = env::var("SCAN_WORKDIR").unwrap_or_else(|_| ".".to_string());

        Ok(AppConfig {
            github_token,
            github_repository,
            policy_path,
            server_host,
            server_port,
            dry_run_mode,
            metrics_dir,
            audit_log_path,
            decision_log_path,
            slack_webhook_url,
            server_id,
            scan_workdir,
        })
    }

    /// Split `owner/repo` into its two halves
    pub fn repository_parts(&self) -> Result<(String, String), SecurityGateError> {
        parse_repo_name(&self.github_repository)
    }
}

pub fn parse_repo_name(full_name: &str) -> Result<(String, String), SecurityGateError> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(SecurityGateError::ConfigError(format!(
            "Invalid repository name '{}', expected owner/repo",
            full_name
        ))),
    }
}
