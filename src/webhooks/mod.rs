//! GitHub webhook surface

pub mod comment;
pub mod github;
pub mod issues;
pub mod pull_request;
pub mod review;

use serde_json::Value;
use std::sync::Arc;

use crate::config::{AppConfig, SecurityPolicy};
use crate::enforcement::MergeOrchestrator;
use crate::github::VcsClient;
use crate::metrics::MetricsStore;
use crate::vulnerability::VulnerabilityReconciler;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub policy: Arc<SecurityPolicy>,
    pub vcs: Arc<dyn VcsClient>,
    pub orchestrator: Arc<MergeOrchestrator>,
    pub reconciler: Arc<VulnerabilityReconciler>,
    pub metrics: Arc<MetricsStore>,
}

pub(crate) fn repo_name(payload: &Value) -> Option<&str> {
    payload
        .get("repository")
        .and_then(|r| r.get("full_name"))
        .and_then(|n| n.as_str())
}

pub(crate) fn sender_login(payload: &Value, object: &str) -> Option<String> {
    payload
        .get(object)
        .and_then(|o| o.get("user"))
        .and_then(|u| u.get("login"))
        .and_then(|l| l.as_str())
        .map(|s| s.to_string())
}
