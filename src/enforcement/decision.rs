//! Merge decision model
//!
//! A [`MergeDecision`] records the path one evaluation took through the
//! decision states and where it stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enforcement::gates::{CHANGE_APPROVAL, CODE_REVIEW};
use crate::enforcement::post_merge::ActionOutcome;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::analysis::ChangeSetId;
use crate::config::MergeStrategy;
use crate::enforcement::gates::GateResult;
use crate::risk::RiskAssessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Start,
    RiskAssessed,
    GateChecked,
    StrategySelected,
    Blocked,
    ManualReviewRequested,
    AwaitingApproval,
    PreMergeChecking,
    Merging,
    Merged,
    MergeFailed,
}

impl DecisionState {
    /// Where an evaluation pass may stop
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DecisionState::Blocked
                | DecisionState::ManualReviewRequested
                | DecisionState::AwaitingApproval
                | DecisionState::Merged
                | DecisionState::MergeFailed
        )
    }

    /// Final, but resumable by an external event
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            DecisionState::ManualReviewRequested | DecisionState::AwaitingApproval
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionState::Start => "start",
            DecisionState::RiskAssessed => "risk_assessed",
            DecisionState::GateChecked => "gate_checked",
            DecisionState::StrategySelected => "strategy_selected",
            DecisionState::Blocked => "blocked",
            DecisionState::ManualReviewRequested => "manual_review_requested",
            DecisionState::AwaitingApproval => "awaiting_approval",
            DecisionState::PreMergeChecking => "pre_merge_checking",
            DecisionState::Merging => "merging",
            DecisionState::Merged => "merged",
            DecisionState::MergeFailed => "merge_failed",
        }
    }
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit bypass of failed gates; always attributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOverride {
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeDecision {
    pub changeset: ChangeSetId,
    pub head_sha: String,
    pub state: DecisionState,
    /// Every state entered, in order, starting at `Start`
    pub visited: Vec<DecisionState>,
    pub assessment: Option<RiskAssessment>,
    pub gates: Option<GateResult>,
    pub strategy: Option<MergeStrategy>,
    pub gate_override: Option<GateOverride>,
    pub failed_checks: Vec<String>,
    pub commit_sha: Option<String>,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
    /// Post-merge actions or the cleanup hook, filled in when published
    #[serde(default)]
    pub follow_up: Vec<ActionOutcome>,
}

impl MergeDecision {
    pub fn start(changeset: ChangeSetId, head_sha: String) -> Self {
        Self {
            changeset,
            head_sha,
            state: DecisionState::Start,
            visited: vec![DecisionState::Start],
            assessment: None,
            gates: None,
            strategy: None,
            gate_override: None,
            failed_checks: Vec::new(),
            commit_sha: None,
            reason: String::new(),
            decided_at: Utc::now(),
            follow_up: Vec::new(),
        }
    }

    pub fn enter(&mut self, state: DecisionState) {
        self.state = state;
        self.visited.push(state);
    }

    pub fn finish(&mut self, state: DecisionState, reason: impl Into<String>) {
        self.enter(state);
        self.reason = reason.into();
        self.decided_at = Utc::now();
    }

    pub fn visited(&self, state: DecisionState) -> bool {
        self.visited.contains(&state)
    }

    pub fn risk_level(&self) -> Option<crate::risk::RiskLevel> {
        self.assessment.as_ref().map(|a| a.level)
    }
}

/// Last decision per change set
#[derive(Default)]
pub struct DecisionBook {
    decisions: Mutex<HashMap<ChangeSetId, MergeDecision>>,
}

impl DecisionBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChangeSetId, MergeDecision>> {
        self.decisions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, decision: &MergeDecision) {
        self.lock().insert(decision.changeset.clone(), decision.clone());
    }

    pub fn get(&self, id: &ChangeSetId) -> Option<MergeDecision> {
        self.lock().get(id).cloned()
    }

    /// Decision awaiting approval for exactly this head commit
    pub fn awaiting_approval(&self, id: &ChangeSetId, head_sha: &str) -> Option<MergeDecision> {
        self.get(id)
            .filter(|d| d.state == DecisionState::AwaitingApproval && d.head_sha == head_sha)
    }

    /// Blocked decision that an approval could unblock
    pub fn blocked_on_approval(&self, id: &ChangeSetId) -> Option<MergeDecision> {
        self.get(id).filter(|d| {
            d.state == DecisionState::Blocked
                && d.gates.as_ref().map_or(false, |g| {
                    g.failed_gates
                        .iter()
                        .any(|name| name == CHANGE_APPROVAL || name == CODE_REVIEW)
                })
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
