//! Dry-run executor
//!
//! Records the actions that WOULD have executed without touching any external
//! service. An optional quota mimics a rate-limited API (e.g. a daily post
//! allowance) so the scheduler's backoff can be exercised end to end.

use crate::error::{ExecutionError, RateLimit};
use crate::executor::ActionExecutor;
use crate::signal::SelectedSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tracks usage within the current quota window
struct QuotaWindow {
    limit: u32,
    window: chrono::Duration,
    started: DateTime<Utc>,
    used: u32,
}

impl QuotaWindow {
    fn new(limit: u32, window: chrono::Duration) -> Self {
        Self {
            limit,
            window,
            started: Utc::now(),
            used: 0,
        }
    }

    /// Consume one call, rolling the window over if it has elapsed
    fn take(&mut self, now: DateTime<Utc>) -> Result<u32, RateLimit> {
        if now >= self.started + self.window {
            self.started = now;
            self.used = 0;
        }
        if self.used >= self.limit {
            return Err(RateLimit {
                reset_at: Some(self.started + self.window),
                remaining: Some(0),
                limit: Some(self.limit),
            });
        }
        self.used += 1;
        Ok(self.limit - self.used)
    }
}

#[derive(Clone, Default)]
pub struct DryRunExecutor {
    journal: Arc<RwLock<Vec<SelectedSignal>>>,
    quota: Option<Arc<RwLock<QuotaWindow>>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow at most `limit` actions per `window`
    pub fn with_quota(mut self, limit: u32, window: chrono::Duration) -> Self {
        self.quota = Some(Arc::new(RwLock::new(QuotaWindow::new(limit, window))));
        self
    }

    /// Signals recorded so far, oldest first
    pub async fn executed(&self) -> Vec<SelectedSignal> {
        self.journal.read().await.clone()
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, selected: &SelectedSignal) -> Result<String, ExecutionError> {
        let remaining = match &self.quota {
            Some(quota) => {
                let mut quota = quota.write().await;
                let remaining = quota
                    .take(Utc::now())
                    .map_err(ExecutionError::RateLimited)?;
                Some(remaining)
            }
            None => None,
        };

        self.journal.write().await.push(selected.clone());

        tracing::info!(
            observation = %selected.observation_id,
            direction = selected.direction().name(),
            confidence = selected.confidence,
            "Dry run: action recorded"
        );

        let mut details = format!(
            "dry run: would {} {} at {:.1}% confidence",
            selected.direction().name(),
            selected.observation_id,
            selected.confidence * 100.0
        );
        if let Some(remaining) = remaining {
            details.push_str(&format!(" ({} left in window)", remaining));
        }
        Ok(details)
    }
}
