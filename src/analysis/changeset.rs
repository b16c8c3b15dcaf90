//! Change set model and unified diff parsing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a change set: `owner/repo#number`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetId(String);

impl ChangeSetId {
    pub fn new(repo: &str, number: u64) -> Self {
        Self(format!("{}#{}", repo, number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// GitHub's author association, used as author trust metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Owner,
    Member,
    Collaborator,
    Contributor,
    FirstTimeContributor,
    FirstTimer,
    Mannequin,
    #[serde(other)]
    None,
}

impl AuthorAssociation {
    pub fn parse(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_ascii_uppercase()))
            .unwrap_or(AuthorAssociation::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub association: AuthorAssociation,
    pub is_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer: String,
    pub state: ReviewState,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    #[serde(other)]
    Stale,
}

/// One external check run reported against the head commit.
/// `conclusion` is `None` while the check is still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub conclusion: Option<CheckConclusion>,
}

/// A proposed change under risk evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: Author,
    pub head_sha: String,
    pub base_sha: String,
    pub diff: String,
    pub reviews: Vec<Review>,
    pub checks: Vec<CheckResult>,
}

impl ChangeSet {
    pub fn id(&self) -> ChangeSetId {
        ChangeSetId::new(&self.repo, self.number)
    }

    pub fn files(&self) -> Vec<DiffFile> {
        parse_unified_diff(&self.diff)
    }

    /// Latest decisive review state per reviewer (later reviews supersede
    /// earlier ones, plain comments do not change a prior decision).
    pub fn latest_reviews(&self) -> HashMap<String, ReviewState> {
        let mut reviews: Vec<&Review> = self.reviews.iter().collect();
        reviews.sort_by_key(|r| r.submitted_at);

        let mut latest = HashMap::new();
        for review in reviews {
            match review.state {
                ReviewState::Commented | ReviewState::Pending => {
                    latest.entry(review.reviewer.clone()).or_insert(review.state);
                }
                _ => {
                    latest.insert(review.reviewer.clone(), review.state);
                }
            }
        }
        latest
    }

    pub fn approvers(&self) -> Vec<String> {
        let mut approvers: Vec<String> = self
            .latest_reviews()
            .into_iter()
            .filter(|(_, state)| *state == ReviewState::Approved)
            .map(|(reviewer, _)| reviewer)
            .collect();
        approvers.sort();
        approvers
    }

    pub fn has_approval(&self) -> bool {
        !self.approvers().is_empty()
    }

    pub fn changes_requested(&self) -> bool {
        self.latest_reviews()
            .values()
            .any(|state| *state == ReviewState::ChangesRequested)
    }

    /// True only if at least one check whose name contains `name` exists and
    /// every such check concluded successfully. Missing or still-running
    /// checks never count as passed.
    pub fn check_succeeded(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        let matching: Vec<&CheckResult> = self
            .checks
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .collect();

        !matching.is_empty()
            && matching
                .iter()
                .all(|c| c.conclusion == Some(CheckConclusion::Success))
    }
}

/// Changes to a single file extracted from a unified diff
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffFile {
    pub path: String,
    pub added_lines: Vec<String>,
    pub removed_lines: usize,
    pub is_new: bool,
    pub is_deleted: bool,
}

/// Parse a unified (git) diff into per-file changes
pub fn parse_unified_diff(diff: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current: Option<DiffFile> = None;
    let mut in_hunk = false;
    let mut lines = diff.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(file) = current.take() {
                files.push(file);
            }
            in_hunk = false;
            let path = rest
                .split_whitespace()
                .last()
                .map(|p| p.trim_start_matches("b/").to_string())
                .unwrap_or_default();
            current = Some(DiffFile {
                path,
                ..DiffFile::default()
            });
            continue;
        }

        // A bare `---`/`+++` header pair (no `diff --git` line) also starts a file
        let header_pair = line.starts_with("--- ")
            && lines.peek().map_or(false, |next| next.starts_with("+++ "));
        if header_pair && (in_hunk || current.is_none()) {
            if let Some(file) = current.take() {
                files.push(file);
            }
            in_hunk = false;
            current = Some(DiffFile::default());
        }

        if !in_hunk {
            let file = current.get_or_insert_with(DiffFile::default);
            if line.starts_with("new file mode") {
                file.is_new = true;
            } else if line.starts_with("deleted file mode") {
                file.is_deleted = true;
            } else if let Some(path) = line.strip_prefix("+++ ") {
                if path != "/dev/null" {
                    file.path = path.trim_start_matches("b/").to_string();
                }
            } else if let Some(path) = line.strip_prefix("--- ") {
                if path == "/dev/null" {
                    file.is_new = true;
                } else if file.path.is_empty() {
                    file.path = path.trim_start_matches("a/").to_string();
                }
            } else if line.starts_with("@@") {
                in_hunk = true;
            }
            continue;
        }

        let Some(file) = current.as_mut() else {
            continue;
        };
        if line.starts_with("@@") {
            continue;
        } else if let Some(added) = line.strip_prefix('+') {
            file.added_lines.push(added.to_string());
        } else if line.starts_with('-') {
            file.removed_lines += 1;
        }
    }

    if let Some(file) = current.take() {
        files.push(file);
    }
    files.retain(|f| !f.path.is_empty());
    files
}
