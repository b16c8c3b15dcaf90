use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::enforcement::GateOverride;
use crate::external;
use crate::webhooks::{repo_name, sender_login, AppState};

pub const OVERRIDE_COMMAND: &str = "/security-override";

/// Reason given to `/security-override <reason>`, if the body is that command
pub fn parse_override_command(body: &str) -> Option<String> {
    let rest = body.trim().strip_prefix(OVERRIDE_COMMAND)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let reason = rest.lines().next().unwrap_or("").trim();
    Some(reason.to_string())
}

pub async fn handle_comment_event(
    state: &AppState,
    payload: &Value,
) -> Result<Json<Value>, StatusCode> {
    let action = payload.get("action").and_then(|a| a.as_str()).unwrap_or("");
    if action != "created" {
        return Ok(Json(json!({"status": "ignored"})));
    }

    let repo = repo_name(payload).ok_or(StatusCode::BAD_REQUEST)?;
    let issue = payload.get("issue").ok_or(StatusCode::BAD_REQUEST)?;
    let pr_number = issue
        .get("number")
        .and_then(|n| n.as_u64())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let commenter = sender_login(payload, "comment").unwrap_or_else(|| "unknown".to_string());
    let body = payload
        .get("comment")
        .and_then(|c| c.get("body"))
        .and_then(|b| b.as_str())
        .unwrap_or("");

    let Some(reason) = parse_override_command(body) else {
        return Ok(Json(json!({"status": "ignored"})));
    };

    if issue.get("pull_request").is_none() {
        return Ok(Json(json!({"status": "not_a_pull_request"})));
    }

    if reason.is_empty() {
        warn!("Override on PR #{} by {} has no reason", pr_number, commenter);
        return Ok(Json(json!({"status": "missing_reason"})));
    }

    if !state.orchestrator.is_security_team_member(&commenter) {
        warn!(
            "Override on PR #{} rejected: {} is not on the security team",
            pr_number, commenter
        );
        return Ok(Json(json!({"status": "unauthorized"})));
    }

    info!("Processing security override from {} on PR #{}", commenter, pr_number);

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

    let gate_override = GateOverride {
        actor: commenter,
        reason,
    };
    let decision = state
        .orchestrator
        .process(&changeset, state.reconciler.signal(), Some(gate_override))
        .await;

    Ok(Json(json!({
        "status": decision.state.as_str(),
        "reason": decision.reason,
    })))
}
