//! Environment overrides
//!
//! Applied after the config file (or defaults) are loaded, so a deployment can
//! tune the loop without editing JSON:
//!
//! ```bash
//! export MONITOR_VARIANT=posting        # switches the schedule preset
//! export MONITOR_INTERVAL_MS=30000      # normal tick cadence
//! export MONITOR_MIN_CONFIDENCE=0.75    # action gate threshold
//! ```

use super::{Config, Variant};
use crate::{Error, Result};
use std::collections::HashMap;

/// Environment variable names
pub mod env_vars {
    pub const VARIANT: &str = "MONITOR_VARIANT";
    pub const INTERVAL_MS: &str = "MONITOR_INTERVAL_MS";
    pub const MIN_CONFIDENCE: &str = "MONITOR_MIN_CONFIDENCE";
}

impl Config {
    /// Apply overrides from `flags`, falling back to the process environment
    /// for keys the flags leave unset
    pub fn apply_env(&mut self, flags: &HashMap<&str, String>) -> Result<()> {
        self.apply_overrides(|key| {
            flags
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Priority:
    /// 1. `MONITOR_VARIANT` swaps in that variant's schedule preset
    /// 2. `MONITOR_INTERVAL_MS` replaces the tick interval
    /// 3. `MONITOR_MIN_CONFIDENCE` replaces the gate threshold
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(env_vars::VARIANT) {
            let variant: Variant = raw.parse()?;
            tracing::info!(variant = variant.name(), "Using variant from environment");
            self.set_variant(variant);
        }

        if let Some(raw) = lookup(env_vars::INTERVAL_MS) {
            let interval_ms = raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{}={} is not valid: {}", env_vars::INTERVAL_MS, raw, e))
            })?;
            tracing::debug!(interval_ms, "Using interval from environment");
            self.schedule.interval_ms = interval_ms;
        }

        if let Some(raw) = lookup(env_vars::MIN_CONFIDENCE) {
            let min_confidence = raw.trim().parse::<f64>().map_err(|e| {
                Error::Config(format!(
                    "{}={} is not valid: {}",
                    env_vars::MIN_CONFIDENCE,
                    raw,
                    e
                ))
            })?;
            tracing::debug!(min_confidence, "Using gate threshold from environment");
            self.gate.min_confidence = min_confidence;
        }

        self.validate()
    }
}
