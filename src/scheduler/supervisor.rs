//! Startup supervisor
//!
//! Wraps the initial connection/authentication step. A fatal handshake failure
//! restarts the whole startup after a fixed delay, with no retry cap. A
//! handshake that reports an exhausted quota waits out the rate limit first.

use super::backoff::{delay_until, BackoffPolicy};
use super::Scheduler;
use crate::error::HandshakeError;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Connects to whatever the loop depends on before it may start
#[async_trait]
pub trait Handshake: Send + Sync {
    /// On success, returns status lines worth logging (identity, network
    /// version, remaining quota, ...)
    async fn connect(&self) -> std::result::Result<Vec<String>, HandshakeError>;
}

pub struct Supervisor {
    handshake: Arc<dyn Handshake>,
    scheduler: Arc<Scheduler>,
    policy: BackoffPolicy,
    restart_delay: Duration,
    interval: Duration,
    min_confidence: f64,
}

impl Supervisor {
    /// Supervise `scheduler` using its schedule settings for cadence and backoff
    pub fn new(
        handshake: Arc<dyn Handshake>,
        scheduler: Arc<Scheduler>,
        min_confidence: f64,
    ) -> Self {
        let schedule = scheduler.schedule();
        Self {
            handshake,
            policy: BackoffPolicy::from(schedule),
            restart_delay: schedule.restart_delay(),
            interval: schedule.interval(),
            min_confidence,
            scheduler,
        }
    }

    /// Tick at `interval` instead of the schedule's configured interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Handshake until it succeeds, then start the scheduler.
    ///
    /// Returns the number of handshake attempts it took. Only invalid start
    /// parameters are returned as errors; handshake failures are retried.
    pub async fn run(&self) -> Result<u32> {
        let sink = self.scheduler.sink();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            info!(attempt, "Connecting");

            match self.handshake.connect().await {
                Ok(status) => {
                    for line in &status {
                        sink.log(line);
                    }
                    self.scheduler
                        .start(self.interval, self.min_confidence)
                        .await?;
                    info!(attempt, "Handshake complete");
                    return Ok(attempt);
                }
                Err(HandshakeError::RateLimited(limit)) => {
                    let now = Utc::now();
                    let resume_at = self.policy.rate_limit_resume_at(&limit, now);
                    let wait = delay_until(resume_at, now);
                    warn!(
                        attempt,
                        resume_at = %resume_at,
                        "Rate limited before start; waiting for reset"
                    );
                    sink.log(&format!("Rate limit in effect ({})", limit));
                    sink.log(&format!(
                        "Waiting {} minutes before starting",
                        wait.as_secs().div_ceil(60)
                    ));
                    tokio::time::sleep(wait).await;
                }
                Err(HandshakeError::Fatal(reason)) => {
                    error!(attempt, reason = %reason, "Handshake failed");
                    sink.log(&format!("Fatal error during startup: {}", reason));
                    sink.log(&format!(
                        "Restarting in {} minutes",
                        self.restart_delay.as_secs().div_ceil(60)
                    ));
                    tokio::time::sleep(self.restart_delay).await;
                }
            }
        }
    }
}
