use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::external;
use crate::webhooks::{repo_name, AppState};

const EVALUATED_ACTIONS: &[&str] = &["opened", "synchronize", "reopened", "ready_for_review"];

pub async fn handle_pull_request_event(
    state: &AppState,
    payload: &Value,
) -> Result<Json<Value>, StatusCode> {
    let action = payload
        .get("action")
        .and_then(|a| a.as_str())
        .unwrap_or("unknown");

    if !EVALUATED_ACTIONS.contains(&action) {
        return Ok(Json(json!({"status": "ignored", "action": action})));
    }

    let repo = repo_name(payload).ok_or(StatusCode::BAD_REQUEST)?;
    let pr_number = payload
        .get("pull_request")
        .and_then(|pr| pr.get("number"))
        .and_then(|n| n.as_u64())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if payload
        .get("pull_request")
        .and_then(|pr| pr.get("draft"))
        .and_then(|d| d.as_bool())
        .unwrap_or(false)
    {
        info!("PR #{} in {} is a draft, not evaluating", pr_number, repo);
        return Ok(Json(json!({"status": "draft"})));
    }

    info!("Evaluating PR #{} in {}", pr_number, repo);

    let timeout = state.policy.external_timeout();
    let changeset = external::call("vcs", timeout, state.vcs.get_changeset(repo, pr_number))
        .await
        .map_err(|e| {
            warn!("Failed to fetch PR #{}: {}", pr_number, e);
            StatusCode::BAD_GATEWAY
        })?;

    let decision = state
        .orchestrator
        .process(&changeset, state.reconciler.signal(), None)
        .await;

    Ok(Json(json!({
        "status": decision.state.as_str(),
        "reason": decision.reason,
        "riskLevel": decision.risk_level().map(|l| l.as_str()),
    })))
}
