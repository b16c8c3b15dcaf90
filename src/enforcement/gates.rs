//! Mandatory merge gates
//!
//! A fixed catalog of five gates evaluated against the risk factors and the
//! external check/review state of a change set. Only gates marked `required`
//! can block a merge.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{ChangeSet, ChangeSetAnalyzer, RiskFactors};
use crate::config::SecurityGatesConfig;

pub const SECURITY_SCAN: &str = "securityScan";
pub const NO_CRITICAL_VULNS: &str = "noCriticalVulns";
pub const TESTS_PASS: &str = "testsPass";
pub const CODE_REVIEW: &str = "codeReview";
pub const CHANGE_APPROVAL: &str = "changeApproval";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub required: bool,
    pub passed: bool,
    pub description: String,
}

impl Gate {
    fn new(name: &str, required: bool, passed: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            required,
            passed,
            description: description.to_string(),
        }
    }

    pub fn blocks(&self) -> bool {
        self.required && !self.passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub all_passed: bool,
    pub failed_gates: Vec<String>,
    pub can_override: bool,
    pub gates: Vec<Gate>,
}

impl GateResult {
    pub fn from_gates(gates: Vec<Gate>, can_override: bool) -> Self {
        let failed_gates: Vec<String> = gates
            .iter()
            .filter(|g| g.blocks())
            .map(|g| g.name.clone())
            .collect();

        Self {
            all_passed: failed_gates.is_empty(),
            failed_gates,
            can_override,
            gates,
        }
    }

    pub fn gate(&self, name: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.name == name)
    }
}

/// Repository-wide vulnerability state published by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilitySignal {
    pub open_critical: u32,
}

pub struct GateEvaluator {
    config: SecurityGatesConfig,
}

impl GateEvaluator {
    pub fn new(config: SecurityGatesConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        changeset: &ChangeSet,
        factors: &RiskFactors,
        analyzer: &ChangeSetAnalyzer,
        signal: VulnerabilitySignal,
    ) -> GateResult {
        let security_approval = changeset
            .approvers()
            .iter()
            .any(|a| analyzer.is_security_team_member(a));

        let gates = vec![
            Gate::new(
                SECURITY_SCAN,
                self.config.require_security_scan,
                changeset.check_succeeded("security"),
                "Security scan check completed successfully",
            ),
            Gate::new(
                NO_CRITICAL_VULNS,
                self.config.block_on_critical_vulns,
                !factors.security_changes.has_critical_vulns && signal.open_critical == 0,
                "No critical vulnerabilities in the change or the repository",
            ),
            Gate::new(
                TESTS_PASS,
                self.config.require_test_pass,
                changeset.check_succeeded("test"),
                "Test suite completed successfully",
            ),
            Gate::new(
                CODE_REVIEW,
                self.config.require_code_review,
                security_approval,
                "Approved by a security team member",
            ),
            Gate::new(
                CHANGE_APPROVAL,
                factors.security_changes.requires_approval,
                changeset.has_approval(),
                "Security-sensitive changes approved by a reviewer",
            ),
        ];

        let result = GateResult::from_gates(gates, self.config.allow_security_override);
        debug!(
            "Gates for {}: all_passed={} failed={:?}",
            changeset.id(),
            result.all_passed,
            result.failed_gates
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        Author, AuthorAssociation, CheckConclusion, CheckResult, Review, ReviewState,
    };
    use proptest::prelude::*;

    fn changeset(checks: &[(&str, CheckConclusion)], approvers: &[&str]) -> ChangeSet {
        ChangeSet {
            repo: "acme/app".to_string(),
            number: 3,
            title: "Change".to_string(),
            body: String::new(),
            author: Author {
                login: "dev".to_string(),
                association: AuthorAssociation::Member,
                is_bot: false,
            },
            head_sha: "head".to_string(),
            base_sha: "base".to_string(),
            diff: String::new(),
            reviews: approvers
                .iter()
                .map(|a| Review {
                    reviewer: a.to_string(),
                    state: ReviewState::Approved,
                    submitted_at: None,
                })
                .collect(),
            checks: checks
                .iter()
                .map(|(name, conclusion)| CheckResult {
                    name: name.to_string(),
                    conclusion: Some(*conclusion),
                })
                .collect(),
        }
    }

    fn analyzer() -> ChangeSetAnalyzer {
        ChangeSetAnalyzer::new(vec!["sec".to_string()]).unwrap()
    }

    #[test]
    fn test_all_gates_pass() {
        let cs = changeset(
            &[("security", CheckConclusion::Success), ("test", CheckConclusion::Success)],
            &[],
        );
        let result = GateEvaluator::new(SecurityGatesConfig::default()).evaluate(
            &cs,
            &RiskFactors::default(),
            &analyzer(),
            VulnerabilitySignal::default(),
        );
        assert!(result.all_passed);
        assert!(result.failed_gates.is_empty());
        assert!(!result.can_override);
        assert!(!result.gate(CHANGE_APPROVAL).unwrap().required);
    }

    #[test]
    fn test_missing_check_fails_required_gate() {
        let cs = changeset(&[("security", CheckConclusion::Success)], &[]);
        let result = GateEvaluator::new(SecurityGatesConfig::default()).evaluate(
            &cs,
            &RiskFactors::default(),
            &analyzer(),
            VulnerabilitySignal::default(),
        );
        assert!(!result.all_passed);
        assert_eq!(result.failed_gates, vec![TESTS_PASS.to_string()]);
    }

    #[test]
    fn test_change_approval_required_for_sensitive_changes() {
        let cs = changeset(
            &[("security", CheckConclusion::Success), ("test", CheckConclusion::Success)],
            &[],
        );
        let mut factors = RiskFactors::default();
        factors.security_changes.requires_approval = true;

        let evaluator = GateEvaluator::new(SecurityGatesConfig::default());
        let result = evaluator.evaluate(&cs, &factors, &analyzer(), VulnerabilitySignal::default());
        assert_eq!(result.failed_gates, vec![CHANGE_APPROVAL.to_string()]);

        let approved = changeset(
            &[("security", CheckConclusion::Success), ("test", CheckConclusion::Success)],
            &["reviewer"],
        );
        let result =
            evaluator.evaluate(&approved, &factors, &analyzer(), VulnerabilitySignal::default());
        assert!(result.all_passed);
    }

    #[test]
    fn test_repository_critical_vulns_block() {
        let cs = changeset(
            &[("security", CheckConclusion::Success), ("test", CheckConclusion::Success)],
            &[],
        );
        let result = GateEvaluator::new(SecurityGatesConfig::default()).evaluate(
            &cs,
            &RiskFactors::default(),
            &analyzer(),
            VulnerabilitySignal { open_critical: 2 },
        );
        assert_eq!(result.failed_gates, vec![NO_CRITICAL_VULNS.to_string()]);
    }

    #[test]
    fn test_code_review_needs_security_team() {
        let config = SecurityGatesConfig {
            require_code_review: true,
            ..SecurityGatesConfig::default()
        };
        let checks = [("security", CheckConclusion::Success), ("test", CheckConclusion::Success)];

        let result = GateEvaluator::new(config.clone()).evaluate(
            &changeset(&checks, &["someone"]),
            &RiskFactors::default(),
            &analyzer(),
            VulnerabilitySignal::default(),
        );
        assert_eq!(result.failed_gates, vec![CODE_REVIEW.to_string()]);

        let result = GateEvaluator::new(config).evaluate(
            &changeset(&checks, &["sec"]),
            &RiskFactors::default(),
            &analyzer(),
            VulnerabilitySignal::default(),
        );
        assert!(result.all_passed);
    }

    proptest! {
        #[test]
        fn all_passed_iff_required_gates_pass(flags in prop::collection::vec((any::<bool>(), any::<bool>()), 0..8)) {
            let gates: Vec<Gate> = flags
                .iter()
                .enumerate()
                .map(|(i, (required, passed))| Gate::new(&format!("gate{}", i), *required, *passed, ""))
                .collect();
            let result = GateResult::from_gates(gates.clone(), false);

            let expected = gates.iter().all(|g| !g.required || g.passed);
            prop_assert_eq!(result.all_passed, expected);
            for name in &result.failed_gates {
                let gate = gates.iter().find(|g| &g.name == name).unwrap();
                prop_assert!(gate.required);
            }
        }
    }
}
