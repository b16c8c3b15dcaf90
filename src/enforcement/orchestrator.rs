//! Merge orchestrator
//!
//! Drives one change set from `Start` to a final state in a single pass:
//! risk assessment, gate evaluation, strategy selection, pre-merge checks
//! and the merge itself. Publishing the outcome (status check, labels,
//! review requests, audit, metrics) is a separate step so the pass itself
//! stays easy to test.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analysis::{ChangeSet, ChangeSetAnalyzer};
use crate::audit::{AuditEvent, AuditLogger};
use crate::config::SecurityPolicy;
use crate::enforcement::decision::{DecisionBook, DecisionState, GateOverride, MergeDecision};
use crate::enforcement::decision_log::DecisionLogger;
use crate::enforcement::gates::{GateEvaluator, VulnerabilitySignal};
use crate::enforcement::merge_block::{GateDisposition, MergeBlocker};
use crate::enforcement::post_merge::PostMergeActions;
use crate::enforcement::pre_merge::PreMergeValidator;
use crate::enforcement::status_checks::StatusCheckGenerator;
use crate::error::Result;
use crate::external;
use crate::github::{MergeRequest, VcsClient};
use crate::metrics::MetricsStore;
use crate::notify::Notifier;
use crate::risk::RiskScorer;
use crate::vulnerability::ScannerSet;

pub const SECURITY_REVIEW_LABEL: &str = "security-review-required";
pub const EMERGENCY_LABEL: &str = "emergency-protocol";
pub const AWAITING_APPROVAL_LABEL: &str = "awaiting-security-approval";

pub struct MergeOrchestrator {
    policy: Arc<SecurityPolicy>,
    analyzer: ChangeSetAnalyzer,
    scorer: RiskScorer,
    gates: GateEvaluator,
    pre_merge: PreMergeValidator,
    post_merge: PostMergeActions,
    vcs: Arc<dyn VcsClient>,
    metrics: Arc<MetricsStore>,
    book: Arc<DecisionBook>,
    decision_log: DecisionLogger,
    audit: Option<AuditLogger>,
}

impl MergeOrchestrator {
    pub fn new(
        policy: Arc<SecurityPolicy>,
        scanners: ScannerSet,
        vcs: Arc<dyn VcsClient>,
        notifiers: Vec<Arc<dyn Notifier>>,
        metrics: Arc<MetricsStore>,
    ) -> Result<Self> {
        let analyzer = ChangeSetAnalyzer::new(policy.security_team.clone())?;
        let scorer = RiskScorer::new(policy.risk_weights.clone());
        let gates = GateEvaluator::new(policy.security_gates.clone());
        let pre_merge = PreMergeValidator::new(policy.clone(), scanners)?;
        let post_merge = PostMergeActions::new(
            vcs.clone(),
            notifiers,
            policy.notification_channels.clone(),
            policy.external_timeout(),
        );

        Ok(Self {
            policy,
            analyzer,
            scorer,
            gates,
            pre_merge,
            post_merge,
            vcs,
            metrics,
            book: Arc::new(DecisionBook::new()),
            decision_log: DecisionLogger::default(),
            audit: None,
        })
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_decision_log(mut self, decision_log: DecisionLogger) -> Self {
        self.decision_log = decision_log;
        self
    }

    pub fn book(&self) -> &DecisionBook {
        &self.book
    }

    pub fn is_security_team_member(&self, login: &str) -> bool {
        self.analyzer.is_security_team_member(login)
    }

    /// Evaluate and publish the outcome
    pub async fn process(
        &self,
        changeset: &ChangeSet,
        signal: VulnerabilitySignal,
        gate_override: Option<GateOverride>,
    ) -> MergeDecision {
        let mut decision = self.evaluate(changeset, signal, gate_override).await;
        self.publish(changeset, &mut decision).await;
        decision
    }

    /// Resume a decision parked in `AwaitingApproval` for this head commit.
    /// Returns `None` when there is nothing to resume.
    pub async fn resume_with_approval(&self, changeset: &ChangeSet) -> Option<MergeDecision> {
        let parked = self.book.awaiting_approval(&changeset.id(), &changeset.head_sha)?;
        info!("Resuming {} after approval", changeset.id());

        let mut decision = self.from_strategy(changeset, parked).await;
        self.publish(changeset, &mut decision).await;
        Some(decision)
    }

    /// Handle a new approval: resume a parked decision, or start a new cycle
    /// when the last one was blocked by a missing approval. Returns `None`
    /// when the approval changes nothing.
    pub async fn on_approval(
        &self,
        changeset: &ChangeSet,
        signal: VulnerabilitySignal,
    ) -> Option<MergeDecision> {
        if let Some(decision) = self.resume_with_approval(changeset).await {
            return Some(decision);
        }

        self.book.blocked_on_approval(&changeset.id())?;
        info!("Re-evaluating {} after approval", changeset.id());
        Some(self.process(changeset, signal, None).await)
    }

    /// One pass through the decision states, stopping at the first final
    /// state. The merge is the only host mutation performed here.
    pub async fn evaluate(
        &self,
        changeset: &ChangeSet,
        signal: VulnerabilitySignal,
        gate_override: Option<GateOverride>,
    ) -> MergeDecision {
        let mut decision = MergeDecision::start(changeset.id(), changeset.head_sha.clone());

        let factors = self.analyzer.analyze(changeset);
        let assessment = self.scorer.assess(&factors);
        info!(
            "Risk for {}: {:.2} ({})",
            changeset.id(),
            assessment.score,
            assessment.level.as_str()
        );
        decision.assessment = Some(assessment);
        decision.enter(DecisionState::RiskAssessed);

        let gates = self
            .gates
            .evaluate(changeset, &factors, &self.analyzer, signal);
        let disposition = MergeBlocker::disposition(&gates, gate_override.as_ref());
        decision.gates = Some(gates);
        decision.enter(DecisionState::GateChecked);

        match disposition {
            GateDisposition::Pass => {}
            GateDisposition::Overridden(o) => {
                warn!(
                    "[OVERRIDE] {} bypasses failed gates for {}: {}",
                    o.actor,
                    changeset.id(),
                    o.reason
                );
                decision.gate_override = Some(o);
            }
            GateDisposition::Blocked(reason) => {
                decision.finish(DecisionState::Blocked, reason);
                return decision;
            }
        }

        self.from_strategy(changeset, decision).await
    }

    async fn from_strategy(&self, changeset: &ChangeSet, mut decision: MergeDecision) -> MergeDecision {
        let level = match decision.risk_level() {
            Some(level) => level,
            None => {
                decision.finish(DecisionState::Blocked, "No risk assessment available");
                return decision;
            }
        };

        let strategy = self.policy.strategy_for(level);
        decision.strategy = Some(strategy);
        decision.enter(DecisionState::StrategySelected);

        if level.requires_human() || !strategy.auto_merge {
            let reason = if strategy.emergency_protocol {
                format!("{} risk: emergency protocol, manual review required", level.as_str())
            } else {
                format!("{} risk: manual review required", level.as_str())
            };
            decision.finish(DecisionState::ManualReviewRequested, reason);
            return decision;
        }

        if strategy.require_approval && !changeset.has_approval() {
            decision.finish(
                DecisionState::AwaitingApproval,
                format!("{} risk: approval required before merge", level.as_str()),
            );
            return decision;
        }

        decision.enter(DecisionState::PreMergeChecking);
        let report = self.pre_merge.run(changeset).await;
        if !report.passed() {
            decision.failed_checks = report.failures();
            let reason = format!("Pre-merge checks failed: {}", decision.failed_checks.join("; "));
            decision.finish(DecisionState::MergeFailed, reason);
            return decision;
        }

        decision.enter(DecisionState::Merging);
        let request = self.merge_request(changeset, &decision);
        match external::call("vcs", self.policy.external_timeout(), self.vcs.merge(&changeset.repo, &request)).await {
            Ok(commit_sha) => {
                let reason = format!("Merged as {}", commit_sha);
                decision.commit_sha = Some(commit_sha);
                decision.finish(DecisionState::Merged, reason);
            }
            Err(e) => {
                error!("Merge of {} failed: {}", changeset.id(), e);
                decision.finish(DecisionState::MergeFailed, format!("Merge failed: {}", e));
            }
        }
        decision
    }

    fn merge_request(&self, changeset: &ChangeSet, decision: &MergeDecision) -> MergeRequest {
        let payload = audit_payload(decision);
        MergeRequest {
            number: changeset.number,
            head_sha: changeset.head_sha.clone(),
            method: self.policy.merge_method,
            commit_title: format!("{} (#{})", changeset.title, changeset.number),
            commit_message: format!("Security gate audit:\n{}", payload),
        }
    }

    /// Apply the outcome to the host and local records. Every step is
    /// best-effort and independent of the others.
    pub async fn publish(&self, changeset: &ChangeSet, decision: &mut MergeDecision) {
        let timeout = self.policy.external_timeout();
        let repo = changeset.repo.as_str();

        let status = StatusCheckGenerator::for_decision(decision);
        if let Err(e) = external::call("vcs", timeout, self.vcs.post_status(repo, &changeset.head_sha, &status)).await {
            warn!("Failed to post status for {}: {}", changeset.id(), e);
        }

        let labels = labels_for(decision);
        if !labels.is_empty() {
            if let Err(e) = external::call("vcs", timeout, self.vcs.add_labels(repo, changeset.number, &labels)).await {
                warn!("Failed to label {}: {}", changeset.id(), e);
            }
        }

        if decision.state == DecisionState::ManualReviewRequested && !self.policy.security_team.is_empty() {
            if let Err(e) = external::call(
                "vcs",
                timeout,
                self.vcs.request_reviewers(repo, changeset.number, &self.policy.security_team),
            )
            .await
            {
                warn!("Failed to request security review for {}: {}", changeset.id(), e);
            }
        }

        if let Err(e) = self.decision_log.log_decision(decision) {
            warn!("Failed to log decision for {}: {}", changeset.id(), e);
        }
        self.metrics
            .record_decision(decision.state, decision.gate_override.is_some());
        self.append_audit(decision).await;

        // a failed follow-up is reported on the decision, the state stays put
        decision.follow_up = match decision.state {
            DecisionState::Merged => self.post_merge.after_merge(changeset, decision).await,
            DecisionState::MergeFailed => vec![self.post_merge.cleanup(changeset, decision).await],
            _ => Vec::new(),
        };
        self.book.record(decision);
    }

    async fn append_audit(&self, decision: &MergeDecision) {
        let Some(audit) = &self.audit else {
            return;
        };
        let subject = decision.changeset.as_str();
        let payload = audit_payload(decision);

        if let Some(o) = &decision.gate_override {
            let mut metadata = BTreeMap::new();
            metadata.insert("actor".to_string(), o.actor.clone());
            metadata.insert("reason".to_string(), o.reason.clone());
            if let Err(e) = audit.record(AuditEvent::GateOverride, subject, &payload, metadata).await {
                error!("Failed to audit override for {}: {}", subject, e);
            }
        }

        let event = match decision.state {
            DecisionState::Merged => AuditEvent::Merge,
            DecisionState::MergeFailed => AuditEvent::MergeFailure,
            _ => return,
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("headSha".to_string(), decision.head_sha.clone());
        metadata.insert("reason".to_string(), decision.reason.clone());
        if let Some(sha) = &decision.commit_sha {
            metadata.insert("commitSha".to_string(), sha.clone());
        }
        if let Err(e) = audit.record(event, subject, &payload, metadata).await {
            error!("Failed to audit {} for {}: {}", decision.state, subject, e);
        }
    }
}

pub fn labels_for(decision: &MergeDecision) -> Vec<String> {
    match decision.state {
        DecisionState::ManualReviewRequested => {
            let mut labels = vec![SECURITY_REVIEW_LABEL.to_string()];
            if decision.strategy.map(|s| s.emergency_protocol).unwrap_or(false) {
                labels.push(EMERGENCY_LABEL.to_string());
            }
            labels
        }
        DecisionState::AwaitingApproval => vec![AWAITING_APPROVAL_LABEL.to_string()],
        _ => Vec::new(),
    }
}

/// Risk level, gate outcomes, override and timestamp carried with the merge
pub fn audit_payload(decision: &MergeDecision) -> serde_json::Value {
    let gates: BTreeMap<String, bool> = decision
        .gates
        .as_ref()
        .map(|g| g.gates.iter().map(|gate| (gate.name.clone(), gate.passed)).collect())
        .unwrap_or_default();

    json!({
        "changeset": decision.changeset.as_str(),
        "headSha": decision.head_sha,
        "riskLevel": decision.risk_level().map(|l| l.as_str()),
        "riskScore": decision.assessment.as_ref().map(|a| a.score),
        "gates": gates,
        "override": decision.gate_override,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
