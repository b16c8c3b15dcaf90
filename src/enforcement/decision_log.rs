//! Merge decision logger
//!
//! Logs every decision that reaches a final state, and optionally appends it
//! to a JSON log file.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::enforcement::decision::{DecisionState, MergeDecision};
use crate::error::SecurityGateError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoggedDecision<'a> {
    dry_run: bool,
    #[serde(flatten)]
    decision: &'a MergeDecision,
}

#[derive(Clone, Default)]
pub struct DecisionLogger {
    pub dry_run_mode: bool,
    log_path: Option<String>,
}

impl DecisionLogger {
    pub fn new(dry_run_mode: bool, log_path: Option<String>) -> Self {
        Self {
            dry_run_mode,
            log_path,
        }
    }

    pub fn log_decision(&self, decision: &MergeDecision) -> Result<(), SecurityGateError> {
        self.log_to_console(decision);

        if let Some(path) = &self.log_path {
            self.log_to_file(decision, path)?;
        }
        Ok(())
    }

    fn prefix(&self, state: DecisionState) -> &'static str {
        if self.dry_run_mode {
            return "[DRY-RUN]";
        }
        match state {
            DecisionState::Merged | DecisionState::MergeFailed => "[MERGE]",
            DecisionState::Blocked => "[BLOCKED]",
            _ => "[DECISION]",
        }
    }

    fn log_to_console(&self, decision: &MergeDecision) {
        let level = decision
            .risk_level()
            .map(|l| l.as_str())
            .unwrap_or("unknown");

        if let Some(o) = &decision.gate_override {
            warn!(
                "[OVERRIDE] Failed gates for {} overridden by {}: {}",
                decision.changeset, o.actor, o.reason
            );
        }

        info!(
            "{} {} -> {} ({} risk): {}",
            self.prefix(decision.state),
            decision.changeset,
            decision.state,
            level,
            decision.reason
        );

        let path: Vec<&str> = decision.visited.iter().map(|s| s.as_str()).collect();
        debug!("{} path: {}", decision.changeset, path.join(" -> "));
    }

    fn log_to_file(&self, decision: &MergeDecision, path: &str) -> Result<(), SecurityGateError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SecurityGateError::IoError(format!("Failed to open decision log: {}", e)))?;

        let entry = serde_json::to_string_pretty(&LoggedDecision {
            dry_run: self.dry_run_mode,
            decision,
        })?;

        writeln!(file, "{}", entry)
            .map_err(|e| SecurityGateError::IoError(format!("Failed to write decision log: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ChangeSetId;
    use crate::enforcement::decision::GateOverride;
    use tempfile::tempdir;

    #[test]
    fn test_prefixes() {
        let live = DecisionLogger::new(false, None);
        assert_eq!(live.prefix(DecisionState::Merged), "[MERGE]");
        assert_eq!(live.prefix(DecisionState::Blocked), "[BLOCKED]");
        assert_eq!(live.prefix(DecisionState::AwaitingApproval), "[DECISION]");

        let dry = DecisionLogger::new(true, None);
        assert_eq!(dry.prefix(DecisionState::Merged), "[DRY-RUN]");
    }

    #[test]
    fn test_log_to_file() {
        let temp_dir = tempdir().unwrap();
        let log_path = temp_dir.path().join("decisions.log");
        let logger = DecisionLogger::new(true, Some(log_path.to_string_lossy().to_string()));

        let mut decision =
            MergeDecision::start(ChangeSetId::new("test/repo", 123), "abc".to_string());
        decision.gate_override = Some(GateOverride {
            actor: "alice".to_string(),
            reason: "hotfix".to_string(),
        });
        decision.finish(DecisionState::Blocked, "Test decision");

        assert!(logger.log_decision(&decision).is_ok());

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("test/repo#123"));
        assert!(content.contains("\"dryRun\": true"));
        assert!(content.contains("alice"));
    }
}
