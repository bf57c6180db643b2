//! When the next tick may fire, given how the last one ended

use crate::config::ScheduleConfig;
use crate::error::RateLimit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// How a tick ended, as far as scheduling is concerned
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing passed the gate (including empty or failed fetches)
    NoAction,
    /// The executor reported success
    Executed,
    /// The executor hit an external rate limit
    RateLimited(RateLimit),
    /// The executor failed for any other reason
    Failed { reason: String },
    /// A collaborator panicked mid-tick
    Faulted { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    interval: Duration,
    rate_limit_buffer: Duration,
    min_backoff: Duration,
    default_reset_window: Duration,
    failure_backoff: Option<Duration>,
}

impl BackoffPolicy {
    /// Replace the normal interval, keeping every backoff setting
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Instant the next tick should fire after `outcome`
    pub fn next_fire_at(&self, outcome: &TickOutcome, now: DateTime<Utc>) -> DateTime<Utc> {
        match outcome {
            TickOutcome::RateLimited(limit) => self.rate_limit_resume_at(limit, now),
            TickOutcome::Failed { .. } => {
                after(now, self.failure_backoff.unwrap_or(self.interval))
            }
            TickOutcome::NoAction | TickOutcome::Executed | TickOutcome::Faulted { .. } => {
                after(now, self.interval)
            }
        }
    }

    /// `max(reset + buffer, now + min_backoff)`
    ///
    /// A limit without a reset time is assumed to reset one default window
    /// from `now`.
    pub fn rate_limit_resume_at(&self, limit: &RateLimit, now: DateTime<Utc>) -> DateTime<Utc> {
        let reset_at = limit
            .reset_at
            .unwrap_or_else(|| after(now, self.default_reset_window));
        let after_reset = after(reset_at, self.rate_limit_buffer);
        let earliest = after(now, self.min_backoff);
        after_reset.max(earliest)
    }
}

impl From<&ScheduleConfig> for BackoffPolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            interval: config.interval(),
            rate_limit_buffer: Duration::from_millis(config.rate_limit_buffer_ms),
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            default_reset_window: Duration::from_millis(config.default_reset_window_ms),
            failure_backoff: config.failure_backoff_ms.map(Duration::from_millis),
        }
    }
}

/// `at + delay`, saturating at the latest representable instant
pub fn after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left from `now` until `at`; zero if `at` has passed
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn trading() -> BackoffPolicy {
        BackoffPolicy::from(&ScheduleConfig::for_variant(Variant::Trading))
    }

    fn posting() -> BackoffPolicy {
        BackoffPolicy::from(&ScheduleConfig::for_variant(Variant::Posting))
    }

    #[test]
    fn test_normal_outcomes_use_interval() {
        let policy = trading();
        for outcome in [
            TickOutcome::NoAction,
            TickOutcome::Executed,
            TickOutcome::Faulted {
                reason: "boom".to_string(),
            },
        ] {
            assert_eq!(
                policy.next_fire_at(&outcome, now()),
                now() + chrono::Duration::seconds(10)
            );
        }
    }

    #[test]
    fn test_rate_limit_waits_for_reset_plus_buffer() {
        let policy = posting();
        let limit = RateLimit::until(now() + minutes(10));
        let next = policy.next_fire_at(&TickOutcome::RateLimited(limit), now());
        assert_eq!(next, now() + minutes(11));
    }

    #[test]
    fn test_rate_limit_in_the_past_uses_min_backoff() {
        let policy = posting();
        let limit = RateLimit::until(now() - minutes(30));
        let next = policy.rate_limit_resume_at(&limit, now());
        assert_eq!(next, now() + minutes(1));
    }

    #[test]
    fn test_rate_limit_without_reset_assumes_a_day() {
        let policy = trading();
        let next = policy.rate_limit_resume_at(&RateLimit::default(), now());
        assert_eq!(next, now() + chrono::Duration::hours(24) + minutes(1));
    }

    #[test]
    fn test_failure_backoff_depends_on_variant() {
        let failed = TickOutcome::Failed {
            reason: "503".to_string(),
        };
        assert_eq!(
            posting().next_fire_at(&failed, now()),
            now() + minutes(5)
        );
        assert_eq!(
            trading().next_fire_at(&failed, now()),
            now() + chrono::Duration::seconds(10)
        );
    }

    #[test]
    fn test_with_interval_keeps_backoff_settings() {
        let policy = posting().with_interval(Duration::from_secs(30));
        assert_eq!(policy.interval(), Duration::from_secs(30));
        let limit = RateLimit::until(now() + minutes(10));
        assert_eq!(policy.rate_limit_resume_at(&limit, now()), now() + minutes(11));
    }

    #[test]
    fn test_delay_until_clamps_at_zero() {
        assert_eq!(delay_until(now() - minutes(1), now()), Duration::ZERO);
        assert_eq!(
            delay_until(now() + minutes(2), now()),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_after_saturates() {
        assert_eq!(after(now(), Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
