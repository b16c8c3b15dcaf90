//! GitHub Webhook Tests
//!
//! Calls the webhook handler directly with the headers and payloads GitHub
//! sends, backed by an in-memory host.

mod common;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use common::*;
use security_gate_app::config::AppConfig;
use security_gate_app::enforcement::MergeOrchestrator;
use security_gate_app::github::VcsAction;
use security_gate_app::vulnerability::issues::{FALSE_POSITIVE_LABEL, VULNERABILITY_LABEL};
use security_gate_app::vulnerability::ScannerSet;
use security_gate_app::webhooks::github::handle_webhook;
use security_gate_app::webhooks::AppState;

fn app_config() -> AppConfig {
    AppConfig {
        github_token: String::new(),
        github_repository: REPO.to_string(),
        policy_path: "config/security-policy.yml".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 3000,
        dry_run_mode: false,
        metrics_dir: "target/test-reports".to_string(),
        audit_log_path: "target/test-audit.jsonl".to_string(),
        decision_log_path: None,
        slack_webhook_url: None,
        server_id: "test-server".to_string(),
        scan_workdir: ".".to_string(),
    }
}

fn app_state(harness: &ReconcilerHarness) -> AppState {
    let policy = Arc::new(test_policy());
    let orchestrator = MergeOrchestrator::new(
        policy.clone(),
        ScannerSet::new(Vec::new(), policy.external_timeout()),
        harness.vcs.clone(),
        Vec::new(),
        harness.metrics.clone(),
    )
    .unwrap();

    AppState {
        config: app_config(),
        policy,
        vcs: harness.vcs.clone(),
        orchestrator: Arc::new(orchestrator),
        reconciler: harness.reconciler.clone(),
        metrics: harness.metrics.clone(),
    }
}

fn headers(event: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-github-event", HeaderValue::from_str(event).unwrap());
    headers.insert("x-github-delivery", HeaderValue::from_static("delivery-1"));
    headers
}

async fn send(state: &AppState, event: &str, payload: Value) -> (StatusCode, Value) {
    let (status, Json(body)) =
        handle_webhook(State(state.clone()), headers(event), Json(payload)).await;
    (status, body)
}

fn pull_request_payload(action: &str, number: u64, draft: bool) -> Value {
    json!({
        "action": action,
        "repository": {"full_name": REPO},
        "pull_request": {"number": number, "draft": draft},
    })
}

fn comment_payload(number: u64, login: &str, body: &str) -> Value {
    json!({
        "action": "created",
        "repository": {"full_name": REPO},
        "issue": {"number": number, "pull_request": {"url": "https://example.test"}},
        "comment": {"body": body, "user": {"login": login}},
    })
}

#[tokio::test]
async fn test_ping_and_unknown_events() {
    let harness = reconciler_harness(test_policy());
    let state = app_state(&harness);

    let (status, body) = send(&state, "ping", json!({"zen": "Keep it logically awesome."})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pong");

    let (status, body) = send(&state, "deployment", json!({"action": "created"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn test_opened_pull_request_is_evaluated() {
    let harness = reconciler_harness(test_policy());
    harness.vcs.insert_changeset(readme_changeset(21));
    let state = app_state(&harness);

    let (status, body) = send(&state, "pull_request", pull_request_payload("opened", 21, false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "merged");
    assert_eq!(body["riskLevel"], "low");
    assert!(harness.vcs.actions().contains(&VcsAction::Merge { number: 21 }));
}

#[tokio::test]
async fn test_draft_and_closed_pull_requests_are_skipped() {
    let harness = reconciler_harness(test_policy());
    harness.vcs.insert_changeset(readme_changeset(22));
    let state = app_state(&harness);

    let (_, body) = send(&state, "pull_request", pull_request_payload("opened", 22, true)).await;
    assert_eq!(body["status"], "draft");

    let (_, body) = send(&state, "pull_request", pull_request_payload("closed", 22, false)).await;
    assert_eq!(body["status"], "ignored");

    assert!(harness.vcs.actions().is_empty());
}

#[tokio::test]
async fn test_unknown_pull_request_is_bad_gateway() {
    let harness = reconciler_harness(test_policy());
    let state = app_state(&harness);

    let (status, _) = send(&state, "pull_request", pull_request_payload("opened", 404, false)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_approving_review_resumes_parked_decision() {
    let harness = reconciler_harness(test_policy());
    let cs = medium_changeset(23);
    harness.vcs.insert_changeset(cs.clone());
    let state = app_state(&harness);

    let (_, body) = send(&state, "pull_request", pull_request_payload("opened", 23, false)).await;
    assert_eq!(body["status"], "awaiting_approval");

    let mut approved = cs;
    approve(&mut approved, "reviewer");
    harness.vcs.insert_changeset(approved);

    let review = json!({
        "action": "submitted",
        "repository": {"full_name": REPO},
        "pull_request": {"number": 23},
        "review": {"state": "APPROVED", "user": {"login": "reviewer"}},
    });
    let (_, body) = send(&state, "pull_request_review", review).await;

    assert_eq!(body["status"], "merged");
    assert!(harness.vcs.actions().contains(&VcsAction::Merge { number: 23 }));
}

#[tokio::test]
async fn test_approving_review_reruns_decision_blocked_on_approval() {
    let harness = reconciler_harness(test_policy());
    let cs = changeset(25, file_diff(".env", &["FEATURE_FLAGS=beta"]));
    harness.vcs.insert_changeset(cs.clone());
    let state = app_state(&harness);

    let (_, body) = send(&state, "pull_request", pull_request_payload("opened", 25, false)).await;
    assert_eq!(body["status"], "blocked");

    let review = json!({
        "action": "submitted",
        "repository": {"full_name": REPO},
        "pull_request": {"number": 25},
        "review": {"state": "APPROVED", "user": {"login": "reviewer"}},
    });

    let mut approved = cs;
    approve(&mut approved, "reviewer");
    harness.vcs.insert_changeset(approved);
    let (_, body) = send(&state, "pull_request_review", review.clone()).await;

    assert_eq!(body["status"], "merged");
    assert!(harness.vcs.actions().contains(&VcsAction::Merge { number: 25 }));

    // nothing left to act on
    let (_, body) = send(&state, "pull_request_review", review).await;
    assert_eq!(body["status"], "no_pending_decision");
}

#[tokio::test]
async fn test_override_command_requires_security_team() {
    let harness = reconciler_harness(test_policy());
    let mut cs = readme_changeset(24);
    cs.checks.retain(|c| c.name != "test");
    harness.vcs.insert_changeset(cs);
    let state = app_state(&harness);

    let (_, body) = send(
        &state,
        "issue_comment",
        comment_payload(24, "dev", "/security-override tests are flaky"),
    )
    .await;
    assert_eq!(body["status"], "unauthorized");

    let (_, body) = send(&state, "issue_comment", comment_payload(24, "sec-lead", "/security-override")).await;
    assert_eq!(body["status"], "missing_reason");

    // Overrides are disabled by the default policy, so the gate still blocks
    let (_, body) = send(
        &state,
        "issue_comment",
        comment_payload(24, "sec-lead", "/security-override tests are flaky"),
    )
    .await;
    assert_eq!(body["status"], "blocked");
    assert!(!harness
        .vcs
        .actions()
        .iter()
        .any(|a| matches!(a, VcsAction::Merge { .. })));
}

#[tokio::test]
async fn test_closed_false_positive_feeds_metrics() {
    let harness = reconciler_harness(test_policy());
    let state = app_state(&harness);

    let payload = json!({
        "action": "closed",
        "repository": {"full_name": REPO},
        "issue": {
            "number": 31,
            "title": "[security] npm:lodash:GHSA-1",
            "body": "",
            "labels": [{"name": VULNERABILITY_LABEL}, {"name": FALSE_POSITIVE_LABEL}],
            "created_at": "2024-01-01T00:00:00Z",
            "closed_at": chrono::Utc::now().to_rfc3339(),
        },
    });
    let (_, body) = send(&state, "issues", payload).await;
    assert_eq!(body["status"], "recorded");
    assert_eq!(harness.metrics.false_positive_rate(chrono::Utc::now()), 100.0);

    let reconciler_closed = json!({
        "action": "closed",
        "repository": {"full_name": REPO},
        "issue": {
            "number": 32,
            "title": "[security] npm:minimist:GHSA-2",
            "labels": [{"name": VULNERABILITY_LABEL}],
        },
    });
    let (_, body) = send(&state, "issues", reconciler_closed).await;
    assert_eq!(body["status"], "ignored");
}
