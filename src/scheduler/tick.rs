//! One fetch → score → select → gate → execute → log cycle

use super::backoff::TickOutcome;
use crate::error::ExecutionError;
use crate::executor::{execute_and_record, ActionExecutor};
use crate::gate::ActionGate;
use crate::observation::{Observation, ObservationSource};
use crate::scoring::ScoringEngine;
use crate::selection::select_best;
use crate::signal::{ActionResult, Outcome, SelectedSignal, Signal};
use crate::sink::LogSink;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// What a single tick did
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    /// Observations that made it into the batch
    pub fetched: usize,
    /// Items the source could not retrieve
    pub dropped: usize,
    /// Signals that asked for an action before selection
    pub actionable: usize,
    /// Strongest actionable signal, admitted or not
    pub selected: Option<SelectedSignal>,
    /// Set when the gate admitted a signal and the executor ran
    pub action: Option<ActionResult>,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn empty() -> Self {
        Self {
            fetched: 0,
            dropped: 0,
            actionable: 0,
            selected: None,
            action: None,
            outcome: TickOutcome::NoAction,
        }
    }
}

/// Everything a tick needs, shared by the running loop
pub(crate) struct TickContext {
    pub source: Arc<dyn ObservationSource>,
    pub executor: Arc<dyn ActionExecutor>,
    pub sink: Arc<dyn LogSink>,
    pub engine: Arc<ScoringEngine>,
    pub gate: ActionGate,
    pub last_batch: Arc<RwLock<Vec<Observation>>>,
}

impl TickContext {
    /// Run one tick, converting a collaborator panic into a logged fault
    pub async fn run_guarded(&self) -> TickReport {
        match AssertUnwindSafe(self.run()).catch_unwind().await {
            Ok(report) => report,
            Err(panic) => {
                let reason = panic_message(&*panic);
                error!(reason = %reason, "Tick aborted by a panic");
                self.sink.log(&format!("Tick aborted: {}", reason));
                TickReport {
                    outcome: TickOutcome::Faulted { reason },
                    ..TickReport::empty()
                }
            }
        }
    }

    async fn run(&self) -> TickReport {
        let mut report = TickReport::empty();

        let batch = self.fetch(&mut report).await;
        report.fetched = batch.len();

        if batch.is_empty() {
            self.sink.log("No observations this tick");
        } else {
            self.sink.log("Market summary:");
            for observation in &batch {
                self.sink.log(&summary_line(observation));
            }
        }

        let signals: Vec<Signal> = batch.iter().map(|o| self.engine.score(o)).collect();
        report.actionable = signals.iter().filter(|s| s.action.is_act()).count();
        debug!(
            scored = signals.len(),
            actionable = report.actionable,
            "Scored batch"
        );

        let selected = select_best(signals);
        report.selected = selected.clone();

        let Some(admitted) = self.gate.admit(selected) else {
            if let Some(best) = &report.selected {
                self.sink.log(&format!(
                    "Strongest signal {} {} at {:.1}% confidence is below the {:.1}% threshold",
                    best.direction().name(),
                    best.observation_id,
                    best.confidence * 100.0,
                    self.gate.min_confidence() * 100.0
                ));
            }
            self.sink.log("No action this tick");
            return report;
        };

        self.announce(&admitted);

        let (result, error) = execute_and_record(self.executor.as_ref(), admitted).await;
        report.outcome = match error {
            None => TickOutcome::Executed,
            Some(ExecutionError::RateLimited(limit)) => TickOutcome::RateLimited(limit),
            Some(ExecutionError::Failed(reason)) => TickOutcome::Failed { reason },
        };

        match &result.outcome {
            Outcome::Success(details) => {
                info!(
                    observation = %result.signal.observation_id,
                    direction = result.signal.direction().name(),
                    "Action executed"
                );
                self.sink.log(&format!("Action executed: {}", details));
            }
            Outcome::Failure(reason) => {
                warn!(
                    observation = %result.signal.observation_id,
                    reason = %reason,
                    "Action failed"
                );
                self.sink.log(&format!("Action failed: {}", reason));
            }
        }
        report.action = Some(result);

        report
    }

    /// Fetch the batch, dropping failed items; a failed fetch is an empty batch
    async fn fetch(&self, report: &mut TickReport) -> Vec<Observation> {
        let items = match self.source.fetch_batch().await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Observation fetch failed");
                self.sink.log(&format!("Error updating observations: {}", e));
                return Vec::new();
            }
        };

        let mut batch = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Ok(observation) => batch.push(observation),
                Err(e) => {
                    report.dropped += 1;
                    warn!(id = %e.id, reason = %e.reason, "Dropped observation");
                    self.sink.log(&format!("Error fetching {} data: {}", e.id, e.reason));
                }
            }
        }

        *self.last_batch.write().await = batch.clone();
        batch
    }

    fn announce(&self, signal: &SelectedSignal) {
        let reasoning = if signal.rationale.is_empty() {
            "none".to_string()
        } else {
            signal.rationale.join(", ")
        };
        self.sink.log("Signal admitted:");
        self.sink.log(&format!("  Observation: {}", signal.observation_id));
        self.sink.log(&format!(
            "  Action: {}",
            signal.direction().name().to_uppercase()
        ));
        self.sink.log(&format!("  Reasoning: {}", reasoning));
        self.sink.log(&format!(
            "  Confidence: {:.1}%",
            signal.confidence * 100.0
        ));
    }
}

fn summary_line(observation: &Observation) -> String {
    let attributes = observation
        .attributes
        .iter()
        .map(|(key, value)| format!("{}={:.4}", key, value))
        .collect::<Vec<_>>()
        .join(" ");
    format!("  {}: {}", observation.id, attributes)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
