//! Action gate
//!
//! Suppresses a selected signal unless its confidence clears the deployment's
//! threshold.

use crate::config::GateConfig;
use crate::signal::SelectedSignal;

/// Pass `selected` through only if `confidence > min_confidence`
pub fn admit(selected: Option<SelectedSignal>, min_confidence: f64) -> Option<SelectedSignal> {
    selected.filter(|signal| signal.confidence > min_confidence)
}

/// Gate holding a fixed confidence threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionGate {
    min_confidence: f64,
}

impl ActionGate {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn admit(&self, selected: Option<SelectedSignal>) -> Option<SelectedSignal> {
        admit(selected, self.min_confidence)
    }
}

impl Default for ActionGate {
    fn default() -> Self {
        Self::from(&GateConfig::default())
    }
}

impl From<&GateConfig> for ActionGate {
    fn from(config: &GateConfig) -> Self {
        Self::new(config.min_confidence)
    }
}
