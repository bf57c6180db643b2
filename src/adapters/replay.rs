//! Fixture-backed observation source
//!
//! Re-reads a JSON array of observations on every tick, so the file can be
//! edited while the loop runs. Entries that do not parse are reported as
//! per-item failures rather than failing the batch.

use crate::error::{FetchItemError, HandshakeError};
use crate::observation::{FetchedItem, Observation, ObservationSource};
use crate::scheduler::Handshake;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_entries(&self) -> Result<Vec<Value>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Fetch(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&content)?;
        match value {
            Value::Array(entries) => Ok(entries),
            _ => Err(Error::Fetch(format!(
                "{} must contain a JSON array of observations",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl ObservationSource for ReplaySource {
    async fn fetch_batch(&self) -> Result<Vec<FetchedItem>> {
        let entries = self.read_entries().await?;
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| parse_entry(index, entry))
            .collect())
    }
}

#[async_trait]
impl Handshake for ReplaySource {
    async fn connect(&self) -> std::result::Result<Vec<String>, HandshakeError> {
        let entries = self
            .read_entries()
            .await
            .map_err(|e| HandshakeError::Fatal(e.to_string()))?;

        tracing::info!(
            path = %self.path.display(),
            entries = entries.len(),
            "Replay feed ready"
        );
        Ok(vec![
            format!("Connected to replay feed {}", self.path.display()),
            format!("Monitoring {} observations per tick", entries.len()),
        ])
    }
}

fn parse_entry(index: usize, entry: Value) -> FetchedItem {
    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{}", index));

    serde_json::from_value::<Observation>(entry)
        .map_err(|e| FetchItemError::new(id, e.to_string()))
}
