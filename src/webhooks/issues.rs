use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::github::client::issue_from_json;
use crate::github::TrackedIssue;
use crate::metrics::Resolution;
use crate::vulnerability::issues::{parse_title, FALSE_POSITIVE_LABEL, MANUAL_REVIEW_LABEL};
use crate::webhooks::AppState;

/// Resolution for a human-closed tracking issue.
///
/// Standard issues closed by the reconciler are recorded when it closes
/// them, so only false positives and manual-review issues count here.
pub fn human_resolution(issue: &TrackedIssue) -> Option<Resolution> {
    let false_positive = issue.has_label(FALSE_POSITIVE_LABEL);
    if !false_positive && !issue.has_label(MANUAL_REVIEW_LABEL) {
        return None;
    }

    Some(Resolution {
        id: parse_title(&issue.title).map(|(_, id)| id),
        opened_at: issue.created_at,
        closed_at: issue.closed_at.unwrap_or_else(Utc::now),
        false_positive,
    })
}

pub async fn handle_issues_event(
    state: &AppState,
    payload: &Value,
) -> Result<Json<Value>, StatusCode> {
    let action = payload.get("action").and_then(|a| a.as_str()).unwrap_or("");
    if action != "closed" {
        return Ok(Json(json!({"status": "ignored"})));
    }

    let issue = payload
        .get("issue")
        .ok_or(StatusCode::BAD_REQUEST)
        .and_then(|i| {
            issue_from_json(i).map_err(|e| {
                warn!("Malformed issue payload: {}", e);
                StatusCode::BAD_REQUEST
            })
        })?;

    match human_resolution(&issue) {
        Some(resolution) => {
            info!(
                "Recorded resolution of issue #{} (false positive: {})",
                issue.number, resolution.false_positive
            );
            state.metrics.record_resolution(resolution);
            Ok(Json(json!({"status": "recorded"})))
        }
        None => Ok(Json(json!({"status": "ignored"}))),
    }
}
