use crate::enforcement::decision::{DecisionState, MergeDecision};
use crate::github::types::{CommitState, StatusCheck};

pub const DECISION_CONTEXT: &str = "security-gate/decision";

pub struct StatusCheckGenerator;

impl StatusCheckGenerator {
    pub fn state_for(state: DecisionState) -> CommitState {
        match state {
            DecisionState::Merged => CommitState::Success,
            DecisionState::Blocked | DecisionState::MergeFailed => CommitState::Failure,
            _ => CommitState::Pending,
        }
    }

    pub fn generate_description(decision: &MergeDecision) -> String {
        let level = decision
            .risk_level()
            .map(|l| l.as_str())
            .unwrap_or("unknown");

        match decision.state {
            DecisionState::Merged => format!("✅ Security Gate: Merged ({} risk)", level),
            DecisionState::Blocked => format!("❌ Security Gate: Blocked - {}", decision.reason),
            DecisionState::MergeFailed => {
                format!("❌ Security Gate: Merge Failed - {}", decision.reason)
            }
            DecisionState::ManualReviewRequested => {
                format!("⏳ Security Gate: Manual Review Required ({} risk)", level)
            }
            DecisionState::AwaitingApproval => {
                format!("⏳ Security Gate: Awaiting Approval ({} risk)", level)
            }
            other => format!("⏳ Security Gate: {}", other),
        }
    }

    pub fn for_decision(decision: &MergeDecision) -> StatusCheck {
        StatusCheck {
            state: Self::state_for(decision.state),
            description: Self::generate_description(decision),
            context: DECISION_CONTEXT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ChangeSetId;

    fn decision(state: DecisionState, reason: &str) -> MergeDecision {
        let mut decision = MergeDecision::start(ChangeSetId::new("acme/app", 1), "abc".to_string());
        decision.finish(state, reason);
        decision
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(StatusCheckGenerator::state_for(DecisionState::Merged), CommitState::Success);
        assert_eq!(StatusCheckGenerator::state_for(DecisionState::Blocked), CommitState::Failure);
        assert_eq!(
            StatusCheckGenerator::state_for(DecisionState::MergeFailed),
            CommitState::Failure
        );
        assert_eq!(
            StatusCheckGenerator::state_for(DecisionState::AwaitingApproval),
            CommitState::Pending
        );
        assert_eq!(
            StatusCheckGenerator::state_for(DecisionState::ManualReviewRequested),
            CommitState::Pending
        );
    }

    #[test]
    fn test_blocked_description_carries_reason() {
        let status = StatusCheckGenerator::for_decision(&decision(
            DecisionState::Blocked,
            "Security gates failed, override not allowed: testsPass",
        ));
        assert_eq!(status.context, DECISION_CONTEXT);
        assert!(status.description.contains("testsPass"));
    }
}
