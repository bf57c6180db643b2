//! Monitor Agent
//!
//! An autonomous scheduler that, on every tick:
//! - pulls a batch of observations from an [`ObservationSource`]
//! - scores each one into a buy/sell/suppress [`Signal`]
//! - selects the single strongest actionable signal and gates it on confidence
//! - hands the survivor to an [`ActionExecutor`] and logs the outcome
//!
//! # Failure model
//!
//! - Failed items are dropped; a failed fetch is an empty batch
//! - Execution failures are logged; rate limits push the next tick past the reset
//! - Only the startup handshake can fail the loop, and the [`Supervisor`]
//!   retries it after a fixed delay

pub mod adapters;
pub mod config;
pub mod executor;
pub mod gate;
pub mod observation;
pub mod scheduler;
pub mod scoring;
pub mod selection;
pub mod signal;
pub mod sink;

mod error;

// Re-export commonly used types
pub use config::{Config, ScheduleConfig, ScoringConfig, Variant};
pub use error::{Error, ExecutionError, FetchItemError, HandshakeError, RateLimit, Result};
pub use executor::ActionExecutor;
pub use gate::{admit, ActionGate};
pub use observation::{Observation, ObservationSource};
pub use scheduler::{Handshake, ScheduleState, Scheduler, Supervisor, TickOutcome, TickReport};
pub use scoring::ScoringEngine;
pub use selection::select_best;
pub use signal::{Action, ActionResult, Direction, Outcome, SelectedSignal, Signal};
pub use sink::{LogSink, MemorySink, TracingSink};
