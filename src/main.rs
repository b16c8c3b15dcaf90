use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use security_gate_app::app::{build_services, init_tracing};
use security_gate_app::config::AppConfig;
use security_gate_app::vulnerability::CycleOutcome;
use security_gate_app::webhooks::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Security Gate App");

    let config = AppConfig::load()?;
    info!("Configuration loaded for {}", config.github_repository);

    // Policy problems are fatal here, never per cycle
    let services = build_services(&config)?;
    info!("Security policy validated");

    let state = AppState {
        config: config.clone(),
        policy: services.policy.clone(),
        vcs: services.vcs.clone(),
        orchestrator: services.orchestrator.clone(),
        reconciler: services.reconciler.clone(),
        metrics: services.metrics.clone(),
    };

    // Scheduled reconciliation
    let reconciler = services.reconciler.clone();
    let scan_interval = services.policy.scan_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(scan_interval);
        loop {
            interval.tick().await;
            if let CycleOutcome::Skipped = reconciler.run_cycle().await {
                warn!("Scheduled scan skipped, previous cycle still running");
            }
        }
    });
    info!("Vulnerability reconciler scheduled every {:?}", scan_interval);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_endpoint))
        .route("/webhooks/github", post(webhooks::github::handle_webhook))
        .route("/scan", post(scan_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "security-gate-app",
        "timestamp": chrono::Utc::now()
    }))
}

async fn status_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "security-gate-app",
        "timestamp": chrono::Utc::now(),
        "server_id": state.config.server_id,
        "repository": state.config.github_repository,
        "features": {
            "dry_run": state.config.dry_run_mode,
            "auto_fix": state.policy.auto_fix_enabled,
        },
        "scan_running": state.reconciler.is_running(),
        "vulnerability_signal": state.reconciler.signal(),
        "decisions": state.metrics.decision_counters(),
        "latest_snapshot": state.metrics.latest(),
    }))
}

/// On-demand reconciliation; answers `skipped` while a cycle is running
async fn scan_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    let outcome = state.reconciler.run_cycle().await;
    Json(serde_json::to_value(&outcome).unwrap_or_else(
        |e| serde_json::json!({"status": "error", "error": e.to_string()}),
    ))
}
