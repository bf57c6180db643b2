//! Action executor contract
//!
//! The executor performs the side effect (a trade, a post, a reply) for the
//! signal that passed the gate. Failures are reported, never panicked: the
//! scheduler logs them and uses [`ExecutionError::RateLimited`] to decide when
//! the next tick may run.

use crate::error::ExecutionError;
use crate::signal::{ActionResult, Outcome, SelectedSignal};
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Perform the action and describe what happened on success
    async fn execute(&self, selected: &SelectedSignal) -> Result<String, ExecutionError>;
}

/// Run `executor` and stamp the attempt as an [`ActionResult`]
///
/// The raw error is returned alongside so callers can tell a rate limit from a
/// generic failure.
pub async fn execute_and_record(
    executor: &dyn ActionExecutor,
    selected: SelectedSignal,
) -> (ActionResult, Option<ExecutionError>) {
    let result = executor.execute(&selected).await;
    let executed_at = Utc::now();

    match result {
        Ok(details) => (
            ActionResult {
                signal: selected,
                executed_at,
                outcome: Outcome::Success(details),
            },
            None,
        ),
        Err(e) => (
            ActionResult {
                signal: selected,
                executed_at,
                outcome: Outcome::Failure(e.to_string()),
            },
            Some(e),
        ),
    }
}
