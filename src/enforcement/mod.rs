//! Merge enforcement
//!
//! Gate catalog, merge decision state machine and everything published
//! around a decision.

pub mod decision;
pub mod decision_log;
pub mod gates;
pub mod merge_block;
pub mod orchestrator;
pub mod post_merge;
pub mod pre_merge;
pub mod status_checks;

pub use decision::{DecisionBook, DecisionState, GateOverride, MergeDecision};
pub use decision_log::DecisionLogger;
pub use gates::{Gate, GateEvaluator, GateResult, VulnerabilitySignal};
pub use merge_block::{GateDisposition, MergeBlocker};
pub use orchestrator::MergeOrchestrator;
pub use post_merge::PostMergeActions;
pub use pre_merge::{PreMergeReport, PreMergeValidator};
pub use status_checks::StatusCheckGenerator;
