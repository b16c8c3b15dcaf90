use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::analysis::{
    Author, AuthorAssociation, ChangeSet, CheckConclusion, CheckResult, Review, ReviewState,
};
use crate::config::{parse_repo_name, MergeMethod};
use crate::error::{Result, SecurityGateError};
use crate::github::types::{MergeRequest, NewIssue, StatusCheck, TrackedIssue};

/// Operations the app needs from the version-control host.
///
/// `repo` is always the full `owner/name`.
#[async_trait]
pub trait VcsClient: Send + Sync {
    async fn get_changeset(&self, repo: &str, number: u64) -> Result<ChangeSet>;

    /// Open issues carrying `label`
    async fn list_open_issues(&self, repo: &str, label: &str) -> Result<Vec<TrackedIssue>>;

    async fn create_issue(&self, repo: &str, issue: NewIssue) -> Result<TrackedIssue>;

    /// Post `comment` and close the issue
    async fn close_issue(&self, repo: &str, number: u64, comment: &str) -> Result<()>;

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<()>;

    async fn add_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<()>;

    async fn request_reviewers(&self, repo: &str, number: u64, reviewers: &[String]) -> Result<()>;

    async fn post_status(&self, repo: &str, sha: &str, status: &StatusCheck) -> Result<()>;

    /// Merge and return the resulting commit sha
    async fn merge(&self, repo: &str, request: &MergeRequest) -> Result<String>;
}

fn gh_err(context: &str, e: octocrab::Error) -> SecurityGateError {
    SecurityGateError::GitHubError(format!("{}: {}", context, e))
}

/// octocrab-backed client authenticated with a token
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    pub fn new(token: String) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| gh_err("Failed to create GitHub client", e))?;

        Ok(Self { client })
    }

    async fn get_json(&self, route: &str) -> Result<Value> {
        debug!("GET {}", route);
        self.client
            .get::<Value, _, ()>(route, None)
            .await
            .map_err(|e| gh_err(&format!("GET {}", route), e))
    }
}

/// Issue listing route with an encoded query string
fn open_issues_route(repo: &str, label: &str, page: u32) -> Result<String> {
    let page = page.to_string();
    let url = reqwest::Url::parse_with_params(
        &format!("https://api.github.com/repos/{}/issues", repo),
        &[
            ("state", "open"),
            ("labels", label),
            ("per_page", "100"),
            ("page", page.as_str()),
        ],
    )
    .map_err(|e| SecurityGateError::GitHubError(format!("Invalid issue route for {}: {}", repo, e)))?;

    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

#[async_trait]
impl VcsClient for GitHubClient {
    async fn get_changeset(&self, repo: &str, number: u64) -> Result<ChangeSet> {
        let (owner, name) = parse_repo_name(repo)?;

        let pr = self.get_json(&format!("/repos/{}/pulls/{}", repo, number)).await?;
        let reviews = self
            .get_json(&format!("/repos/{}/pulls/{}/reviews?per_page=100", repo, number))
            .await?;

        let head_sha = pr["head"]["sha"].as_str().unwrap_or_default().to_string();
        let check_runs = self
            .get_json(&format!("/repos/{}/commits/{}/check-runs?per_page=100", repo, head_sha))
            .await?;
        let statuses = self
            .get_json(&format!("/repos/{}/commits/{}/status", repo, head_sha))
            .await?;

        let diff = self
            .client
            .pulls(owner, name)
            .get_diff(number)
            .await
            .map_err(|e| gh_err("Failed to fetch diff", e))?;

        changeset_from_json(repo, &pr, &reviews, &check_runs, &statuses, diff)
    }

    async fn list_open_issues(&self, repo: &str, label: &str) -> Result<Vec<TrackedIssue>> {
        let mut issues = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.get_json(&open_issues_route(repo, label, page)?).await?;
            let parsed = issues_from_json(&batch)?;
            let done = parsed.len() < 100;
            issues.extend(parsed);
            if done {
                break;
            }
            page += 1;
        }
        Ok(issues)
    }

    async fn create_issue(&self, repo: &str, issue: NewIssue) -> Result<TrackedIssue> {
        info!("Creating issue in {}: {}", repo, issue.title);
        let created: Value = self
            .client
            .post(format!("/repos/{}/issues", repo), Some(&issue))
            .await
            .map_err(|e| gh_err("Failed to create issue", e))?;
        issue_from_json(&created)
    }

    async fn close_issue(&self, repo: &str, number: u64, comment: &str) -> Result<()> {
        self.comment(repo, number, comment).await?;
        let _: Value = self
            .client
            .patch(
                format!("/repos/{}/issues/{}", repo, number),
                Some(&json!({ "state": "closed", "state_reason": "completed" })),
            )
            .await
            .map_err(|e| gh_err("Failed to close issue", e))?;
        Ok(())
    }

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        let _: Value = self
            .client
            .post(
                format!("/repos/{}/issues/{}/comments", repo, number),
                Some(&json!({ "body": body })),
            )
            .await
            .map_err(|e| gh_err("Failed to post comment", e))?;
        Ok(())
    }

    async fn add_labels(&self, repo: &str, number: u64, labels: &[String]) -> Result<()> {
        let _: Value = self
            .client
            .post(
                format!("/repos/{}/issues/{}/labels", repo, number),
                Some(&json!({ "labels": labels })),
            )
            .await
            .map_err(|e| gh_err("Failed to add labels", e))?;
        Ok(())
    }

    async fn request_reviewers(&self, repo: &str, number: u64, reviewers: &[String]) -> Result<()> {
        if reviewers.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .client
            .post(
                format!("/repos/{}/pulls/{}/requested_reviewers", repo, number),
                Some(&json!({ "reviewers": reviewers })),
            )
            .await
            .map_err(|e| gh_err("Failed to request reviewers", e))?;
        Ok(())
    }

    async fn post_status(&self, repo: &str, sha: &str, status: &StatusCheck) -> Result<()> {
        let _: Value = self
            .client
            .post(
                format!("/repos/{}/statuses/{}", repo, sha),
                Some(&json!({
                    "state": status.state.as_str(),
                    "description": truncate_description(&status.description),
                    "context": status.context,
                })),
            )
            .await
            .map_err(|e| gh_err("Failed to post status", e))?;
        Ok(())
    }

    async fn merge(&self, repo: &str, request: &MergeRequest) -> Result<String> {
        let method = match request.method {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        };

        let response: Value = self
            .client
            .put(
                format!("/repos/{}/pulls/{}/merge", repo, request.number),
                Some(&json!({
                    "sha": request.head_sha,
                    "merge_method": method,
                    "commit_title": request.commit_title,
                    "commit_message": request.commit_message,
                })),
            )
            .await
            .map_err(|e| SecurityGateError::MergeExecutionError(e.to_string()))?;

        if response["merged"].as_bool() != Some(true) {
            return Err(SecurityGateError::MergeExecutionError(
                response["message"]
                    .as_str()
                    .unwrap_or("merge was not performed")
                    .to_string(),
            ));
        }

        response["sha"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                SecurityGateError::MergeExecutionError("merge response has no sha".to_string())
            })
    }
}

/// Status descriptions are limited to 140 characters by the API
fn truncate_description(description: &str) -> String {
    if description.chars().count() <= 140 {
        description.to_string()
    } else {
        let mut truncated: String = description.chars().take(137).collect();
        truncated.push_str("...");
        truncated
    }
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Assemble a [`ChangeSet`] from the REST payloads of a pull request
pub fn changeset_from_json(
    repo: &str,
    pr: &Value,
    reviews: &Value,
    check_runs: &Value,
    statuses: &Value,
    diff: String,
) -> Result<ChangeSet> {
    let number = pr["number"].as_u64().ok_or_else(|| {
        SecurityGateError::GitHubError("Pull request payload has no number".to_string())
    })?;

    let author = Author {
        login: pr["user"]["login"].as_str().unwrap_or("unknown").to_string(),
        association: AuthorAssociation::parse(pr["author_association"].as_str().unwrap_or("NONE")),
        is_bot: pr["user"]["type"].as_str() == Some("Bot"),
    };

    let reviews = reviews
        .as_array()
        .map(|list| {
            list.iter()
                .map(|r| Review {
                    reviewer: r["user"]["login"].as_str().unwrap_or("unknown").to_string(),
                    state: serde_json::from_value(r["state"].clone()).unwrap_or(ReviewState::Pending),
                    submitted_at: parse_time(&r["submitted_at"]),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut checks: Vec<CheckResult> = check_runs["check_runs"]
        .as_array()
        .map(|runs| {
            runs.iter()
                .map(|run| CheckResult {
                    name: run["name"].as_str().unwrap_or_default().to_string(),
                    conclusion: serde_json::from_value(run["conclusion"].clone()).ok(),
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(list) = statuses["statuses"].as_array() {
        for status in list {
            let conclusion = match status["state"].as_str() {
                Some("success") => Some(CheckConclusion::Success),
                Some("failure") | Some("error") => Some(CheckConclusion::Failure),
                _ => None,
            };
            checks.push(CheckResult {
                name: status["context"].as_str().unwrap_or_default().to_string(),
                conclusion,
            });
        }
    }

    Ok(ChangeSet {
        repo: repo.to_string(),
        number,
        title: pr["title"].as_str().unwrap_or_default().to_string(),
        body: pr["body"].as_str().unwrap_or_default().to_string(),
        author,
        head_sha: pr["head"]["sha"].as_str().unwrap_or_default().to_string(),
        base_sha: pr["base"]["sha"].as_str().unwrap_or_default().to_string(),
        diff,
        reviews,
        checks,
    })
}

pub fn issue_from_json(value: &Value) -> Result<TrackedIssue> {
    let number = value["number"].as_u64().ok_or_else(|| {
        SecurityGateError::GitHubError("Issue payload has no number".to_string())
    })?;

    Ok(TrackedIssue {
        number,
        title: value["title"].as_str().unwrap_or_default().to_string(),
        body: value["body"].as_str().unwrap_or_default().to_string(),
        labels: value["labels"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l["name"].as_str().or_else(|| l.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        created_at: parse_time(&value["created_at"]).unwrap_or_else(Utc::now),
        closed_at: parse_time(&value["closed_at"]),
    })
}

/// Issue listings also contain pull requests; those are skipped
pub fn issues_from_json(value: &Value) -> Result<Vec<TrackedIssue>> {
    let list = value.as_array().ok_or_else(|| {
        SecurityGateError::GitHubError("Issue listing is not an array".to_string())
    })?;

    list.iter()
        .filter(|i| i.get("pull_request").is_none())
        .map(issue_from_json)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_issues_route_encodes_label() {
        let route = open_issues_route("acme/app", "needs triage,security&co", 2).unwrap();
        assert_eq!(
            route,
            "/repos/acme/app/issues?state=open&labels=needs+triage%2Csecurity%26co&per_page=100&page=2"
        );
    }

    #[test]
    fn test_changeset_from_json() {
        let pr = json!({
            "number": 42,
            "title": "Bump lodash",
            "body": null,
            "author_association": "CONTRIBUTOR",
            "user": {"login": "dependabot[bot]", "type": "Bot"},
            "head": {"sha": "abc"},
            "base": {"sha": "def"}
        });
        let reviews = json!([
            {"user": {"login": "alice"}, "state": "APPROVED", "submitted_at": "2024-05-01T10:00:00Z"}
        ]);
        let check_runs = json!({"check_runs": [
            {"name": "security-scan", "conclusion": "success"},
            {"name": "test", "conclusion": null}
        ]});
        let statuses = json!({"statuses": [{"context": "ci/lint", "state": "failure"}]});

        let cs = changeset_from_json("acme/app", &pr, &reviews, &check_runs, &statuses, String::new())
            .unwrap();

        assert_eq!(cs.number, 42);
        assert!(cs.author.is_bot);
        assert_eq!(cs.author.association, AuthorAssociation::Contributor);
        assert_eq!(cs.approvers(), vec!["alice".to_string()]);
        assert!(cs.check_succeeded("security"));
        assert!(!cs.check_succeeded("test"));
        assert!(!cs.check_succeeded("lint"));
        assert_eq!(cs.body, "");
    }

    #[test]
    fn test_issue_listing_skips_pull_requests() {
        let listing = json!([
            {"number": 1, "title": "[security] npm:a:1", "labels": [{"name": "security-vulnerability"}],
             "created_at": "2024-05-01T10:00:00Z"},
            {"number": 2, "title": "PR", "pull_request": {}, "labels": []}
        ]);
        let issues = issues_from_json(&listing).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].has_label("security-vulnerability"));
    }

    #[test]
    fn test_status_description_truncated() {
        let long = "x".repeat(200);
        assert_eq!(truncate_description(&long).chars().count(), 140);
        assert_eq!(truncate_description("short"), "short");
    }
}
