//! Observations and the source that supplies them each tick

use crate::error::FetchItemError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One external data point considered in a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the observed item (e.g. a token symbol)
    pub id: String,
    /// Numeric indicators keyed by name
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl Observation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Attribute value, if present and finite
    pub fn attribute(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).copied().filter(|v| v.is_finite())
    }
}

/// Outcome of fetching one item of a batch
pub type FetchedItem = std::result::Result<Observation, FetchItemError>;

/// Supplies a fresh batch of observations each tick.
///
/// Individual items may fail without failing the batch; an `Err` from
/// `fetch_batch` itself means nothing could be retrieved at all.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<FetchedItem>>;
}
