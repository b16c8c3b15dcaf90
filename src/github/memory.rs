//! In-memory VCS host used by dry runs and tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::analysis::ChangeSet;
use crate::error::{Result, SecurityGateError};
use crate::github::client::VcsClient;
use crate::github::types::{MergeRequest, NewIssue, StatusCheck, TrackedIssue};

/// Every mutating call, in order
#[derive(Debug, Clone, PartialEq)]
pub enum VcsAction {
    CreateIssue { number: u64, title: String },
    CloseIssue { number: u64, comment: String },
    Comment { number: u64, body: String },
    AddLabels { number: u64, labels: Vec<String> },
    RequestReviewers { number: u64, reviewers: Vec<String> },
    PostStatus { sha: String, status: StatusCheck },
    Merge { number: u64 },
}

#[derive(Default)]
struct State {
    changesets: HashMap<u64, ChangeSet>,
    issues: Vec<TrackedIssue>,
    actions: Vec<VcsAction>,
    next_number: u64,
    merge_error: Option<String>,
    comment_error: Option<String>,
}

#[derive(Default)]
pub struct InMemoryVcs {
    state: Mutex<State>,
    fail_issue_listing: AtomicBool,
}

impl InMemoryVcs {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_number: 1000,
                ..State::default()
            }),
            fail_issue_listing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_changeset(&self, changeset: ChangeSet) {
        self.lock().changesets.insert(changeset.number, changeset);
    }

    /// Seed an issue that already exists on the host
    pub fn insert_issue(&self, issue: TrackedIssue) {
        let mut state = self.lock();
        state.next_number = state.next_number.max(issue.number + 1);
        state.issues.push(issue);
    }

    pub fn set_merge_error(&self, error: Option<&str>) {
        self.lock().merge_error = error.map(|e| e.to_string());
    }

    /// Make PR comments fail, leaving every other call working
    pub fn set_comment_error(&self, error: Option<&str>) {
        self.lock().comment_error = error.map(|e| e.to_string());
    }

    pub fn set_fail_issue_listing(&self, fail: bool) {
        self.fail_issue_listing.store(fail, Ordering::SeqCst);
    }

    pub fn issues(&self) -> Vec<TrackedIssue> {
        self.lock().issues.clone()
    }

    pub fn open_issues(&self) -> Vec<TrackedIssue> {
        self.lock()
            .issues
            .iter()
            .filter(|i| i.closed_at.is_none())
            .cloned()
            .collect()
    }

    pub fn actions(&self) -> Vec<VcsAction> {
        self.lock().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }
}

#[async_trait]
impl VcsClient for InMemoryVcs {
    async fn get_changeset(&self, _repo: &str, number: u64) -> Result<ChangeSet> {
        self.lock()
            .changesets
            .get(&number)
            .cloned()
            .ok_or_else(|| SecurityGateError::GitHubError(format!("Pull request {} not found", number)))
    }

    async fn list_open_issues(&self, _repo: &str, label: &str) -> Result<Vec<TrackedIssue>> {
        if self.fail_issue_listing.load(Ordering::SeqCst) {
            return Err(SecurityGateError::GitHubError("issue listing unavailable".to_string()));
        }
        Ok(self
            .lock()
            .issues
            .iter()
            .filter(|i| i.closed_at.is_none() && i.has_label(label))
            .cloned()
            .collect())
    }

    async fn create_issue(&self, _repo: &str, issue: NewIssue) -> Result<TrackedIssue> {
        let mut state = self.lock();
        let number = state.next_number;
        state.next_number += 1;

        let tracked = TrackedIssue {
            number,
            title: issue.title.clone(),
            body: issue.body,
            labels: issue.labels,
            created_at: Utc::now(),
            closed_at: None,
        };
        state.issues.push(tracked.clone());
        state.actions.push(VcsAction::CreateIssue {
            number,
            title: issue.title,
        });
        Ok(tracked)
    }

    async fn close_issue(&self, _repo: &str, number: u64, comment: &str) -> Result<()> {
        let mut state = self.lock();
        let issue = state
            .issues
            .iter_mut()
            .find(|i| i.number == number)
            .ok_or_else(|| SecurityGateError::GitHubError(format!("Issue {} not found", number)))?;
        issue.closed_at = Some(Utc::now());
        state.actions.push(VcsAction::CloseIssue {
            number,
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn comment(&self, _repo: &str, number: u64, body: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = state.comment_error.clone() {
            return Err(SecurityGateError::GitHubError(error));
        }
        state.actions.push(VcsAction::Comment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn add_labels(&self, _repo: &str, number: u64, labels: &[String]) -> Result<()> {
        self.lock().actions.push(VcsAction::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn request_reviewers(&self, _repo: &str, number: u64, reviewers: &[String]) -> Result<()> {
        self.lock().actions.push(VcsAction::RequestReviewers {
            number,
            reviewers: reviewers.to_vec(),
        });
        Ok(())
    }

    async fn post_status(&self, _repo: &str, sha: &str, status: &StatusCheck) -> Result<()> {
        self.lock().actions.push(VcsAction::PostStatus {
            sha: sha.to_string(),
            status: status.clone(),
        });
        Ok(())
    }

    async fn merge(&self, _repo: &str, request: &MergeRequest) -> Result<String> {
        let mut state = self.lock();
        if let Some(error) = state.merge_error.clone() {
            return Err(SecurityGateError::MergeExecutionError(error));
        }
        state.actions.push(VcsAction::Merge {
            number: request.number,
        });
        Ok(format!("merged-{}", request.head_sha))
    }
}
