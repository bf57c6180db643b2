//! Decision types shared by scoring, selection, gating and execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Which way an actionable signal points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

/// Whether a signal asks for an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Act(Direction),
    Suppress,
}

impl Action {
    pub fn is_act(&self) -> bool {
        matches!(self, Action::Act(_))
    }
}

/// Per-observation decision output of the scoring engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub observation_id: String,
    pub action: Action,
    pub score: f64,
    /// Always `score.abs()`
    pub confidence: f64,
    /// Descriptive tags, never used for decisions
    pub rationale: Vec<String>,
}

/// A signal that won selection. Only ever wraps an `Act` signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedSignal {
    #[serde(flatten)]
    signal: Signal,
    #[serde(skip)]
    direction: Direction,
}

impl SelectedSignal {
    /// Wrap `signal` if it asks for an action
    pub fn new(signal: Signal) -> Option<Self> {
        match signal.action {
            Action::Act(direction) => Some(Self { signal, direction }),
            Action::Suppress => None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Deref for SelectedSignal {
    type Target = Signal;

    fn deref(&self) -> &Signal {
        &self.signal
    }
}

/// How an executed action turned out
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Success(String),
    Failure(String),
}

/// Record of one action attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub signal: SelectedSignal,
    pub executed_at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }
}
