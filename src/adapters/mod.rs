//! Collaborator implementations for hosts and local runs
//!
//! Real deployments plug in their own feeds and executors; these cover replaying
//! recorded observations and rehearsing actions without side effects.

mod dry_run;
mod replay;

pub use dry_run::DryRunExecutor;
pub use replay::ReplaySource;
