//! Error types for the monitor agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Observation fetch failed: {0}")]
    Fetch(String),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Action execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rate limit details reported by an external service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// When the quota resets, if the service said so
    pub reset_at: Option<DateTime<Utc>>,
    /// Remaining calls in the current window
    pub remaining: Option<u32>,
    /// Size of the window's quota
    pub limit: Option<u32>,
}

impl RateLimit {
    pub fn until(reset_at: DateTime<Utc>) -> Self {
        Self {
            reset_at: Some(reset_at),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reset_at {
            Some(at) => write!(f, "resets at {}", at.to_rfc3339())?,
            None => write!(f, "reset time unknown")?,
        }
        if let (Some(remaining), Some(limit)) = (self.remaining, self.limit) {
            write!(f, ", {}/{} remaining", remaining, limit)?;
        }
        Ok(())
    }
}

/// Failure reported by an [`ActionExecutor`](crate::executor::ActionExecutor).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("rate limited ({0})")]
    RateLimited(RateLimit),

    #[error("{0}")]
    Failed(String),
}

/// Failure during the initial connection/authentication step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("rate limited before start ({0})")]
    RateLimited(RateLimit),

    #[error("{0}")]
    Fatal(String),
}

/// A single observation that could not be retrieved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to fetch {id}: {reason}")]
pub struct FetchItemError {
    pub id: String,
    pub reason: String,
}

impl FetchItemError {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
