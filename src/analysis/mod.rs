//! Change set analysis
//!
//! Extracts [`RiskFactors`] from a change set's diff and metadata.

pub mod analyzer;
pub mod changeset;
pub mod factors;

pub use analyzer::ChangeSetAnalyzer;
pub use changeset::{
    Author, AuthorAssociation, ChangeSet, ChangeSetId, CheckConclusion, CheckResult, DiffFile,
    Review, ReviewState,
};
pub use factors::RiskFactors;
