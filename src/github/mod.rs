pub mod client;
pub mod dry_run;
pub mod memory;
pub mod types;

pub use client::{GitHubClient, VcsClient};
pub use dry_run::DryRunVcs;
pub use memory::{InMemoryVcs, VcsAction};
pub use types::{CommitState, MergeRequest, NewIssue, StatusCheck, TrackedIssue};
