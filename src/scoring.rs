//! Scoring engine
//!
//! Turns one observation into a weighted score and classifies it:
//!
//! ```text
//! total = w_m * momentum + f(volatility) + g(level)
//! f(v)  = -w_v if v > danger else +w_v
//! g(l)  = +w_l if l < micro  else -w_l
//! ```
//!
//! `total > τ` buys, `total < -τ` sells, anything in between is suppressed.
//! Missing or non-finite attributes count as zero and are tagged as degraded.

use crate::config::ScoringConfig;
use crate::observation::Observation;
use crate::signal::{Action, Direction, Signal};

pub const TAG_STRONG_MOVEMENT: &str = "strong directional movement";
pub const TAG_HIGH_VOLATILITY: &str = "high volatility environment";
pub const TAG_UPWARD_MOMENTUM: &str = "strong upward momentum";
pub const TAG_PRICE_DIP: &str = "significant price dip";
pub const TAG_DEGRADED_PREFIX: &str = "degraded: missing ";

/// Per-indicator contributions to a score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub momentum: f64,
    pub volatility: f64,
    pub level: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.momentum + self.volatility + self.level
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one observation
    pub fn score(&self, observation: &Observation) -> Signal {
        let mut rationale = Vec::new();
        let keys = &self.config.keys;

        let momentum = self.read(observation, &keys.momentum, &mut rationale);
        let volatility = self.read(observation, &keys.volatility, &mut rationale);
        let level = self.read(observation, &keys.level, &mut rationale);

        let total = self.breakdown(momentum, volatility, level).total();
        let action = self.classify(total);

        let cfg = &self.config;
        if total.abs() > cfg.strong_movement {
            rationale.push(TAG_STRONG_MOVEMENT.to_string());
        }
        if volatility > cfg.volatility_danger {
            rationale.push(TAG_HIGH_VOLATILITY.to_string());
        }
        if momentum > cfg.momentum_tag {
            rationale.push(TAG_UPWARD_MOMENTUM.to_string());
        }
        if momentum < -cfg.momentum_tag {
            rationale.push(TAG_PRICE_DIP.to_string());
        }

        Signal {
            observation_id: observation.id.clone(),
            action,
            score: total,
            confidence: total.abs(),
            rationale,
        }
    }

    /// Weighted contributions for already-read indicator values
    pub fn breakdown(&self, momentum: f64, volatility: f64, level: f64) -> ScoreBreakdown {
        let cfg = &self.config;
        let volatility_step = if volatility > cfg.volatility_danger {
            -1.0
        } else {
            1.0
        };
        let level_step = if level < cfg.micro_level { 1.0 } else { -1.0 };

        ScoreBreakdown {
            momentum: momentum * cfg.momentum_weight,
            volatility: volatility_step * cfg.volatility_weight,
            level: level_step * cfg.level_weight,
        }
    }

    fn classify(&self, total: f64) -> Action {
        let threshold = self.config.decision_threshold;
        if total > threshold {
            Action::Act(Direction::Buy)
        } else if total < -threshold {
            Action::Act(Direction::Sell)
        } else {
            Action::Suppress
        }
    }

    fn read(&self, observation: &Observation, key: &str, rationale: &mut Vec<String>) -> f64 {
        match observation.attribute(key) {
            Some(value) => value,
            None => {
                rationale.push(format!("{}{}", TAG_DEGRADED_PREFIX, key));
                0.0
            }
        }
    }
}
