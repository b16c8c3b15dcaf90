use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::webhooks::{comment, issues, pull_request, review, AppState};

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let event_name = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let action = payload
        .get("action")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let delivery = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!("Received webhook {}: {} - {}", delivery, event_name, action);

    let span = info_span!("webhook", delivery = %delivery, event = %event_name);
    let result = async {
        match event_name.as_str() {
            "pull_request" => pull_request::handle_pull_request_event(&state, &payload).await,
            "pull_request_review" => review::handle_review_event(&state, &payload).await,
            "issue_comment" => comment::handle_comment_event(&state, &payload).await,
            "issues" => issues::handle_issues_event(&state, &payload).await,
            "ping" => Ok(Json(json!({"status": "pong"}))),
            _ => {
                warn!("Unhandled webhook event: {}", event_name);
                Ok(Json(json!({"status": "ignored"})))
            }
        }
    }
    .instrument(span)
    .await;

    match result {
        Ok(response) => (StatusCode::OK, response),
        Err(status) => (status, Json(json!({"error": "failed"}))),
    }
}
