//! Configuration for the monitor agent

pub mod env;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Which loop shape the schedule follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Fast polling; failed actions resume the normal cadence
    #[default]
    Trading,
    /// Slow posting cadence; failed actions back off before retrying
    Posting,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Trading => "trading",
            Variant::Posting => "posting",
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trading" => Ok(Variant::Trading),
            "posting" => Ok(Variant::Posting),
            other => Err(Error::Config(format!("Unknown variant: {}", other))),
        }
    }
}

/// Attribute keys read from each observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeKeys {
    pub momentum: String,
    pub volatility: String,
    pub level: String,
}

impl Default for AttributeKeys {
    fn default() -> Self {
        Self {
            momentum: "momentum".to_string(),
            volatility: "volatility".to_string(),
            level: "level".to_string(),
        }
    }
}

/// Weights and thresholds for the scoring engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Multiplier applied to raw momentum
    pub momentum_weight: f64,
    /// Magnitude contributed by the volatility step
    pub volatility_weight: f64,
    /// Magnitude contributed by the price level step
    pub level_weight: f64,
    /// Volatility strictly above this counts against the signal
    pub volatility_danger: f64,
    /// Level strictly below this counts as a micro price
    pub micro_level: f64,
    /// |total| must exceed this to act
    pub decision_threshold: f64,
    /// |total| above this is tagged as strong directional movement
    pub strong_movement: f64,
    /// |momentum| above this is tagged as upward momentum or a dip
    pub momentum_tag: f64,
    pub keys: AttributeKeys,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            momentum_weight: 0.4,
            volatility_weight: 0.3,
            level_weight: 0.3,
            volatility_danger: 15.0,
            micro_level: 0.01,
            decision_threshold: 0.3,
            strong_movement: 0.6,
            momentum_tag: 10.0,
            keys: AttributeKeys::default(),
        }
    }
}

/// Action gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Confidence must be strictly greater than this to act
    pub min_confidence: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
        }
    }
}

/// Tick cadence and backoff settings
///
/// Inside a [`Config`] file, missing fields come from the file's variant
/// preset; standalone, they come from the trading preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Normal delay between ticks (milliseconds)
    pub interval_ms: u64,
    /// Added after a rate limit's reset time (milliseconds)
    pub rate_limit_buffer_ms: u64,
    /// Shortest wait after any rate limit (milliseconds)
    pub min_backoff_ms: u64,
    /// Assumed reset window when a rate limit carries no reset time (milliseconds)
    pub default_reset_window_ms: u64,
    /// Wait after a generic execution failure; `None` keeps the normal interval
    pub failure_backoff_ms: Option<u64>,
    /// Wait before retrying a failed handshake (milliseconds)
    pub restart_delay_ms: u64,
}

impl ScheduleConfig {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Trading => Self {
                interval_ms: 10_000, // 10 seconds
                failure_backoff_ms: None,
                ..Self::base()
            },
            Variant::Posting => Self {
                interval_ms: 15 * 60_000,             // 15 minutes
                failure_backoff_ms: Some(5 * 60_000), // 5 minutes
                ..Self::base()
            },
        }
    }

    fn base() -> Self {
        Self {
            interval_ms: 10_000,
            rate_limit_buffer_ms: 60_000,          // 1 minute
            min_backoff_ms: 60_000,                // 1 minute
            default_reset_window_ms: 86_400_000,   // 24 hours
            failure_backoff_ms: None,
            restart_delay_ms: 5 * 60_000,          // 5 minutes
        }
    }

    /// Move from `from`'s preset onto `to`'s, keeping fields customized
    /// away from `from`'s preset
    fn rebase(&self, from: Variant, to: Variant) -> Self {
        fn keep<T: PartialEq + Copy>(current: T, old: T, new: T) -> T {
            if current != old {
                current
            } else {
                new
            }
        }

        let old = Self::for_variant(from);
        let new = Self::for_variant(to);
        Self {
            interval_ms: keep(self.interval_ms, old.interval_ms, new.interval_ms),
            rate_limit_buffer_ms: keep(
                self.rate_limit_buffer_ms,
                old.rate_limit_buffer_ms,
                new.rate_limit_buffer_ms,
            ),
            min_backoff_ms: keep(self.min_backoff_ms, old.min_backoff_ms, new.min_backoff_ms),
            default_reset_window_ms: keep(
                self.default_reset_window_ms,
                old.default_reset_window_ms,
                new.default_reset_window_ms,
            ),
            failure_backoff_ms: keep(
                self.failure_backoff_ms,
                old.failure_backoff_ms,
                new.failure_backoff_ms,
            ),
            restart_delay_ms: keep(
                self.restart_delay_ms,
                old.restart_delay_ms,
                new.restart_delay_ms,
            ),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct Config {
    /// Loop shape
    pub variant: Variant,
    /// Scoring weights and thresholds
    pub scoring: ScoringConfig,
    /// Action gate threshold
    pub gate: GateConfig,
    /// Cadence and backoff
    pub schedule: ScheduleConfig,
}

/// On-disk shape: `schedule` fields overlay the variant's preset
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    variant: Variant,
    #[serde(default)]
    scoring: ScoringConfig,
    #[serde(default)]
    gate: GateConfig,
    #[serde(default)]
    schedule: Option<Map<String, Value>>,
}

impl TryFrom<ConfigFile> for Config {
    type Error = serde_json::Error;

    fn try_from(file: ConfigFile) -> std::result::Result<Self, serde_json::Error> {
        let mut schedule = ScheduleConfig::for_variant(file.variant);
        if let Some(overrides) = file.schedule {
            let mut merged = serde_json::to_value(&schedule)?;
            if let Value::Object(fields) = &mut merged {
                fields.extend(overrides);
            }
            schedule = serde_json::from_value(merged)?;
        }
        Ok(Self {
            variant: file.variant,
            scoring: file.scoring,
            gate: file.gate,
            schedule,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

impl Config {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            scoring: ScoringConfig::default(),
            gate: GateConfig::default(),
            schedule: ScheduleConfig::for_variant(variant),
        }
    }

    /// Switch variant. Schedule fields still on the old preset move to the
    /// new one; customized fields are kept.
    pub fn set_variant(&mut self, variant: Variant) {
        if variant != self.variant {
            self.schedule = self.schedule.rebase(self.variant, variant);
            self.variant = variant;
        }
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.schedule.interval_ms == 0 {
            return Err(Error::Config("interval_ms must be positive".to_string()));
        }
        if self.schedule.restart_delay_ms == 0 {
            return Err(Error::Config(
                "restart_delay_ms must be positive".to_string(),
            ));
        }
        let gate = self.gate.min_confidence;
        if !gate.is_finite() || gate < 0.0 {
            return Err(Error::Config(format!(
                "min_confidence must be a non-negative number, got {}",
                gate
            )));
        }
        let s = &self.scoring;
        let thresholds = [
            ("momentum_weight", s.momentum_weight),
            ("volatility_weight", s.volatility_weight),
            ("level_weight", s.level_weight),
            ("volatility_danger", s.volatility_danger),
            ("micro_level", s.micro_level),
            ("decision_threshold", s.decision_threshold),
            ("strong_movement", s.strong_movement),
            ("momentum_tag", s.momentum_tag),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(Error::Config(format!("{} must be finite", name)));
            }
        }
        if s.decision_threshold < 0.0 {
            return Err(Error::Config(
                "decision_threshold must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
