//! Run one vulnerability reconciliation cycle and print the report

use anyhow::Result;
use clap::Parser;
use tracing::info;

use security_gate_app::app::{build_services, init_tracing};
use security_gate_app::config::AppConfig;
use security_gate_app::vulnerability::CycleOutcome;

#[derive(Parser)]
#[command(name = "security-scan")]
#[command(about = "Scan, auto-fix and reconcile security issues once")]
struct Cli {
    /// Repository to reconcile (defaults to GITHUB_REPOSITORY)
    #[arg(short, long)]
    repo: Option<String>,

    /// Directory to scan (defaults to SCAN_WORKDIR)
    #[arg(short, long)]
    workdir: Option<String>,

    /// Log host writes instead of performing them
    #[arg(long)]
    dry_run: bool,

    /// Print the full cycle report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(repo) = cli.repo {
        config.github_repository = repo;
    }
    if let Some(workdir) = cli.workdir {
        config.scan_workdir = workdir;
    }
    config.dry_run_mode |= cli.dry_run;

    let services = build_services(&config)?;
    info!("Running reconciliation cycle for {}", config.github_repository);

    let outcome = services.reconciler.run_cycle().await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        CycleOutcome::Skipped => println!("Scan skipped: another cycle is running"),
        CycleOutcome::Completed(report) => {
            println!("Security score: {:.1} ({})", report.score.score, report.score.level.as_str());
            println!(
                "Findings: {} critical, {} high, {} moderate, {} low, {} secrets",
                report.score.counts.critical,
                report.score.counts.high,
                report.score.counts.moderate,
                report.score.counts.low,
                report.score.secrets
            );
            println!(
                "Fixes: {} applied, {} failed, {} already attempted",
                report.fixes.applied.len(),
                report.fixes.failed.len(),
                report.fixes.skipped.len()
            );
            println!(
                "Issues: {} opened, {} manual review, {} closed",
                report.issues_opened.len(),
                report.manual_review_opened.len(),
                report.issues_closed.len()
            );
            if !report.scanner_failures.is_empty() {
                println!("⚠ Degraded scan: {} scanner(s) failed", report.scanner_failures.len());
            }
            for alert in &report.alerts {
                println!("🚨 {}", alert.message);
            }
        }
    }

    Ok(())
}
