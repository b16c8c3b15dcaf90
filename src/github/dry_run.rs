//! Read-through, write-nothing wrapper around a VCS client

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::analysis::ChangeSet;
use crate::error::Result;
use crate::github::client::VcsClient;
use crate::github::types::{MergeRequest, NewIssue, StatusCheck, TrackedIssue};

/// Forwards reads to the wrapped client and logs writes instead of
/// performing them.
pub struct DryRunVcs {
    inner: Arc<dyn VcsClient>,
}

impl DryRunVcs {
    pub fn new(inner: Arc<dyn VcsClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VcsClient for DryRunVcs {
    async fn get_changeset(&self, repo: &str, number: u64) -> Result<ChangeSet> {
        self.inner.get_changeset(repo, number).await
    }

    async fn list_open_issues(&self, repo: &str, label: &str) -> Result<Vec<TrackedIssue>> {
        self.inner.list_open_issues(repo, label).await
    }

    async fn create_issue(&self, repo: &str, issue: NewIssue) -> Result<TrackedIssue> {
        info!("[DRY-RUN] Would create issue in {}: {}", repo, issue.title);
        Ok(TrackedIssue {
            number: 0,
            title: issue.title,
            body: issue.body,
            labels: issue.labels,
            created_at: Utc::now(),
            closed_at: None,
        })
    }

    async fn close_issue(&self, repo: &str, number: u64, _comment: &str) -> Result<()> {
        info!("[DRY-RUN] Would close issue {}#{}", repo, number);
        Ok(())
    }

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        info!("[DRY-RUN] Would comment on {}#{}: {}", repo, number, body);
        Ok(())
    }

    async fn add_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<()> {
        info!("[DRY-RUN] Would label {}#{} with {:?}", repo, number, labels);
        Ok(())
    }

    async fn request_reviewers(&self, repo: &str, number: u64, reviewers: &[String]) -> Result<()> {
        info!("[DRY-RUN] Would request review on {}#{} from {:?}", repo, number, reviewers);
        Ok(())
    }

    async fn post_status(&self, repo: &str, sha: &str, status: &StatusCheck) -> Result<()> {
        info!(
            "[DRY-RUN] Would post {} status on {}@{}: {}",
            status.state.as_str(),
            repo,
            sha,
            status.description
        );
        Ok(())
    }

    async fn merge(&self, repo: &str, request: &MergeRequest) -> Result<String> {
        info!("[DRY-RUN] Would merge {}#{} at {}", repo, request.number, request.head_sha);
        Ok(format!("dry-run-{}", request.head_sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::memory::InMemoryVcs;
    use crate::config::MergeMethod;

    #[tokio::test]
    async fn test_writes_do_not_reach_inner_client() {
        let inner = Arc::new(InMemoryVcs::new());
        let vcs = DryRunVcs::new(inner.clone());

        vcs.comment("acme/app", 1, "hello").await.unwrap();
        let sha = vcs
            .merge(
                "acme/app",
                &MergeRequest {
                    number: 1,
                    head_sha: "abc".to_string(),
                    method: MergeMethod::Squash,
                    commit_title: "t".to_string(),
                    commit_message: "m".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(sha, "dry-run-abc");
        assert!(inner.actions().is_empty());
    }

    #[test]
    fn test_reads_pass_through() {
        let inner = Arc::new(InMemoryVcs::new());
        inner.insert_issue(TrackedIssue {
            number: 9,
            title: "[security] npm:lodash:GHSA-1".to_string(),
            body: String::new(),
            labels: vec!["security-vulnerability".to_string()],
            created_at: chrono::Utc::now(),
            closed_at: None,
        });
        let vcs = DryRunVcs::new(inner);

        let issues = tokio_test::block_on(vcs.list_open_issues("acme/app", "security-vulnerability"))
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert!(tokio_test::block_on(vcs.get_changeset("acme/app", 1)).is_err());
    }
}
