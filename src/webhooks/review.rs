use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::external;
use crate::webhooks::{repo_name, sender_login, AppState};

/// An approving review resumes a decision parked in `AwaitingApproval` or
/// re-runs one blocked by a missing approval
pub async fn handle_review_event(
    state: &AppState,
    payload: &Value,
) -> Result<Json<Value>, StatusCode> {
    let repo = repo_name(payload).ok_or(StatusCode::BAD_REQUEST)?;
    let pr_number = payload
        .get("pull_request")
        .and_then(|pr| pr.get("number"))
        .and_then(|n| n.as_u64())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let reviewer = sender_login(payload, "review").unwrap_or_else(|| "unknown".to_string());
    let review_state = payload
        .get("review")
        .and_then(|r| r.get("state"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown")
        .to_lowercase();

    info!(
        "Review {} by {} for PR #{} in {}",
        review_state, reviewer, pr_number, repo
    );

    if review_state != "approved" {
        return Ok(Json(json!({"status": "ignored"})));
    }

    let changeset = external::call(
        "vcs",
        state.policy.external_timeout(),
        state.vcs.get_changeset(repo, pr_number),
    )
    .await
    .map_err(|e| {
        warn!("Failed to fetch PR #{}: {}", pr_number, e);
        StatusCode::BAD_GATEWAY
    })?;

    match state
        .orchestrator
        .on_approval(&changeset, state.reconciler.signal())
        .await
    {
        Some(decision) => Ok(Json(json!({
            "status": decision.state.as_str(),
            "reason": decision.reason,
        }))),
        None => Ok(Json(json!({"status": "no_pending_decision"}))),
    }
}
