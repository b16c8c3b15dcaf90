//! Dry-run risk and gate report for one pull request

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::sync::Arc;

use security_gate_app::analysis::ChangeSetAnalyzer;
use security_gate_app::app::{init_tracing, load_policy, scanner_set};
use security_gate_app::config::AppConfig;
use security_gate_app::enforcement::{GateEvaluator, MergeOrchestrator, VulnerabilitySignal};
use security_gate_app::github::{DryRunVcs, GitHubClient, VcsClient};
use security_gate_app::metrics::MetricsStore;
use security_gate_app::notify::LogNotifier;
use security_gate_app::risk::RiskScorer;

#[derive(Parser)]
#[command(name = "assess-pr")]
#[command(about = "Score a pull request and show the decision the gate would reach")]
struct Cli {
    /// Pull request number
    #[arg(short, long)]
    pr: u64,

    /// Repository (defaults to GITHUB_REPOSITORY)
    #[arg(short, long)]
    repo: Option<String>,

    /// Open critical vulnerabilities to assume for the repository
    #[arg(long, default_value_t = 0)]
    open_critical: u32,

    /// Also walk the decision states, including pre-merge checks
    #[arg(long)]
    decide: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    let repo = cli.repo.unwrap_or_else(|| config.github_repository.clone());
    let policy = load_policy(&config)?;

    let client: Arc<dyn VcsClient> = Arc::new(GitHubClient::new(config.github_token.clone())?);
    let changeset = client.get_changeset(&repo, cli.pr).await?;
    let signal = VulnerabilitySignal {
        open_critical: cli.open_critical,
    };

    let analyzer = ChangeSetAnalyzer::new(policy.security_team.clone())?;
    let factors = analyzer.analyze(&changeset);
    let assessment = RiskScorer::new(policy.risk_weights.clone()).assess(&factors);
    let gates = GateEvaluator::new(policy.security_gates.clone()).evaluate(
        &changeset,
        &factors,
        &analyzer,
        signal,
    );

    let mut report = json!({
        "changeset": changeset.id(),
        "assessment": assessment,
        "gates": gates,
        "strategy": policy.strategy_for(assessment.level),
    });

    if cli.decide {
        let orchestrator = MergeOrchestrator::new(
            policy.clone(),
            scanner_set(&config, &policy),
            Arc::new(DryRunVcs::new(client)),
            vec![Arc::new(LogNotifier)],
            Arc::new(MetricsStore::in_memory()),
        )?;
        let decision = orchestrator.evaluate(&changeset, signal, None).await;
        report["decision"] = serde_json::to_value(&decision)?;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
