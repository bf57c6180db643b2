//! Scheduler
//!
//! Owns the `Idle → Running → Idle` lifecycle of one monitor loop. The loop is
//! self re-arming: the next tick is scheduled only after the current one has
//! fully settled, so two ticks of the same scheduler never overlap. `stop`
//! cancels the pending timer but lets an in-flight tick finish; a loop started
//! right after waits for that tick before running its own.

pub mod backoff;
pub mod supervisor;
mod tick;

pub use backoff::{BackoffPolicy, TickOutcome};
pub use supervisor::{Handshake, Supervisor};
pub use tick::TickReport;

use crate::config::{Config, ScheduleConfig, ScoringConfig};
use crate::executor::ActionExecutor;
use crate::gate::ActionGate;
use crate::observation::{Observation, ObservationSource};
use crate::scoring::ScoringEngine;
use crate::sink::{LogSink, TracingSink};
use crate::{Error, Result};
use backoff::{after, delay_until};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tick::TickContext;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

/// Lifecycle state of a scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleState {
    pub running: bool,
    /// Normal delay between ticks
    pub tick_interval: Duration,
    /// When the pending tick fires, if one is pending
    pub next_fire_at: Option<DateTime<Utc>>,
}

/// Handle to a spawned loop
struct ActiveLoop {
    run_id: Uuid,
    state: Arc<RwLock<ScheduleState>>,
    stop_tx: watch::Sender<bool>,
    // Never awaited or aborted: an in-flight tick must be allowed to finish
    _task: JoinHandle<()>,
}

pub struct Scheduler {
    source: Arc<dyn ObservationSource>,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn LogSink>,
    engine: Arc<ScoringEngine>,
    schedule: ScheduleConfig,
    active: Mutex<Option<ActiveLoop>>,
    last_batch: Arc<RwLock<Vec<Observation>>>,
    last_report: Arc<RwLock<Option<TickReport>>>,
    // Held for the whole of a tick, across loop restarts
    tick_lock: Arc<Mutex<()>>,
}

impl Scheduler {
    /// Create a scheduler with default scoring and schedule settings
    pub fn new(source: Arc<dyn ObservationSource>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            source,
            executor,
            sink: Arc::new(TracingSink),
            engine: Arc::new(ScoringEngine::default()),
            schedule: ScheduleConfig::default(),
            active: Mutex::new(None),
            last_batch: Arc::new(RwLock::new(Vec::new())),
            last_report: Arc::new(RwLock::new(None)),
            tick_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a scheduler using the scoring and schedule sections of `config`
    pub fn from_config(
        config: &Config,
        source: Arc<dyn ObservationSource>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self::new(source, executor)
            .with_scoring(config.scoring.clone())
            .with_schedule(config.schedule.clone())
    }

    /// Send progress lines to `sink` instead of `tracing`
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.engine = Arc::new(ScoringEngine::new(scoring));
        self
    }

    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        &self.schedule
    }

    pub(crate) fn sink(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }

    /// Start ticking every `interval`, acting on signals above `min_confidence`.
    ///
    /// Does nothing if the loop is already running, whatever the arguments.
    pub async fn start(&self, interval: Duration, min_confidence: f64) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            debug!(run_id = %current.run_id, "Scheduler already running");
            return Ok(());
        }

        if interval.is_zero() {
            return Err(Error::Config("tick interval must be positive".to_string()));
        }
        if !min_confidence.is_finite() || min_confidence < 0.0 {
            return Err(Error::Config(format!(
                "min_confidence must be a non-negative number, got {}",
                min_confidence
            )));
        }

        let run_id = Uuid::new_v4();
        let state = Arc::new(RwLock::new(ScheduleState {
            running: true,
            tick_interval: interval,
            next_fire_at: Some(after(Utc::now(), interval)),
        }));
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = LoopWorker {
            context: TickContext {
                source: self.source.clone(),
                executor: self.executor.clone(),
                sink: self.sink.clone(),
                engine: self.engine.clone(),
                gate: ActionGate::new(min_confidence),
                last_batch: self.last_batch.clone(),
            },
            policy: BackoffPolicy::from(&self.schedule).with_interval(interval),
            state: state.clone(),
            last_report: self.last_report.clone(),
            tick_lock: self.tick_lock.clone(),
            stop_rx,
        };

        info!(
            run_id = %run_id,
            interval_ms = interval.as_millis() as u64,
            min_confidence,
            "Scheduler started"
        );
        self.sink.log(&format!(
            "Agent activated: ticking every {}s, acting above {:.1}% confidence",
            interval.as_secs_f64(),
            min_confidence * 100.0
        ));

        let span = tracing::info_span!("monitor_loop", run_id = %run_id);
        let task = tokio::spawn(worker.run(interval).instrument(span));

        *active = Some(ActiveLoop {
            run_id,
            state,
            stop_tx,
            _task: task,
        });
        Ok(())
    }

    /// Stop ticking. A tick already in progress runs to completion.
    ///
    /// Does nothing if the loop is idle.
    pub async fn stop(&self) {
        let Some(active) = self.active.lock().await.take() else {
            debug!("Scheduler already idle");
            return;
        };

        {
            let mut state = active.state.write().await;
            state.running = false;
            state.next_fire_at = None;
        }
        // Receiver may already be gone if the loop exited on its own
        let _ = active.stop_tx.send(true);

        info!(run_id = %active.run_id, "Scheduler stopped");
        self.sink.log("Agent deactivated");
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Snapshot of the lifecycle state; the idle default when stopped
    pub async fn state(&self) -> ScheduleState {
        match self.active.lock().await.as_ref() {
            Some(active) => active.state.read().await.clone(),
            None => ScheduleState::default(),
        }
    }

    /// Most recent successfully fetched batch
    pub async fn last_batch(&self) -> Vec<Observation> {
        self.last_batch.read().await.clone()
    }

    /// Report of the most recently completed tick
    pub async fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().await.clone()
    }
}

/// The spawned side of a running loop
struct LoopWorker {
    context: TickContext,
    policy: BackoffPolicy,
    state: Arc<RwLock<ScheduleState>>,
    last_report: Arc<RwLock<Option<TickReport>>>,
    tick_lock: Arc<Mutex<()>>,
    stop_rx: watch::Receiver<bool>,
}

impl LoopWorker {
    async fn run(mut self, first_delay: Duration) {
        let mut delay = first_delay;
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                // Fires on stop, or when the scheduler is dropped
                _ = self.stop_rx.changed() => break,
            }
            if *self.stop_rx.borrow() {
                break;
            }

            // A tick from a previously stopped loop may still be running
            let guard = tokio::select! {
                guard = self.tick_lock.lock() => guard,
                _ = self.stop_rx.changed() => break,
            };

            tick += 1;
            let report = self
                .context
                .run_guarded()
                .instrument(tracing::debug_span!("tick", n = tick))
                .await;
            *self.last_report.write().await = Some(report.clone());
            drop(guard);

            let now = Utc::now();
            let next = self.policy.next_fire_at(&report.outcome, now);
            delay = delay_until(next, now);

            {
                let mut state = self.state.write().await;
                if !state.running {
                    break;
                }
                state.next_fire_at = Some(next);
            }

            self.log_reschedule(&report.outcome, next, delay);
        }

        debug!(ticks = tick, "Monitor loop exited");
    }

    fn log_reschedule(&self, outcome: &TickOutcome, next: DateTime<Utc>, delay: Duration) {
        let sink = &self.context.sink;
        match outcome {
            TickOutcome::RateLimited(limit) => {
                info!(
                    next_fire_at = %next,
                    delay_secs = delay.as_secs(),
                    "Rate limited; backing off"
                );
                sink.log(&format!("Rate limit hit ({})", limit));
                sink.log(&format!(
                    "Waiting {} minutes until next attempt",
                    delay.as_secs().div_ceil(60)
                ));
            }
            TickOutcome::Failed { .. } if delay != self.policy.interval() => {
                info!(delay_secs = delay.as_secs(), "Action failed; backing off");
                sink.log(&format!(
                    "Retrying in {} minutes",
                    delay.as_secs().div_ceil(60)
                ));
            }
            _ => {
                debug!(next_fire_at = %next, "Next tick scheduled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, RateLimit};
    use crate::observation::FetchedItem;
    use crate::signal::SelectedSignal;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Replays scripted batches; repeats the last script once exhausted
    struct ScriptedSource {
        fetches: AtomicUsize,
        script: std::sync::Mutex<VecDeque<Result<Vec<FetchedItem>>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<FetchedItem>>>) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                script: std::sync::Mutex::new(script.into()),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn fetch_batch(&self) -> Result<Vec<FetchedItem>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(next) => next,
                None => Ok(vec![Ok(strong("WIF"))]),
            }
        }
    }

    /// Holds every fetch until released
    struct GatedSource {
        release: Notify,
        entered: Notify,
    }

    #[async_trait]
    impl ObservationSource for GatedSource {
        async fn fetch_batch(&self) -> Result<Vec<FetchedItem>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![Ok(strong("BONK"))])
        }
    }

    /// Takes a minute per fetch and records how many fetches overlap
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ObservationSource for SlowSource {
        async fn fetch_batch(&self) -> Result<Vec<FetchedItem>> {
            let fetch = self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![Ok(strong(&format!("T{}", fetch)))])
        }
    }

    struct Recorder {
        calls: AtomicUsize,
        rate_limit_first: Option<RateLimit>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rate_limit_first: None,
            })
        }

        fn rate_limited_once(limit: RateLimit) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rate_limit_first: Some(limit),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionExecutor for Recorder {
        async fn execute(
            &self,
            selected: &SelectedSignal,
        ) -> std::result::Result<String, ExecutionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.rate_limit_first {
                Some(limit) if call == 0 => Err(ExecutionError::RateLimited(limit)),
                _ => Ok(format!("executed {}", selected.observation_id)),
            }
        }
    }

    fn strong(id: &str) -> Observation {
        Observation::new(id)
            .with("momentum", 12.0)
            .with("volatility", 5.0)
            .with("level", 50.0)
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let scheduler = Scheduler::new(ScriptedSource::new(vec![]), Recorder::new());

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        let first = scheduler.state().await;
        scheduler.start(30 * SECOND, 0.1).await.unwrap();
        let second = scheduler.state().await;

        assert!(first.running);
        assert_eq!(first.tick_interval, 10 * SECOND);
        assert_eq!(first, second);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_ignores_bad_arguments() {
        let scheduler = Scheduler::new(ScriptedSource::new(vec![]), Recorder::new());

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        let before = scheduler.state().await;

        assert!(scheduler.start(Duration::ZERO, f64::NAN).await.is_ok());
        assert_eq!(scheduler.state().await, before);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_noop() {
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(ScriptedSource::new(vec![]), Recorder::new())
            .with_sink(Arc::new(sink.clone()));

        scheduler.stop().await;

        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.state().await, ScheduleState::default());
        assert!(sink.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_invalid_start_parameters() {
        let scheduler = Scheduler::new(ScriptedSource::new(vec![]), Recorder::new());
        assert!(scheduler.start(Duration::ZERO, 0.6).await.is_err());
        assert!(scheduler.start(SECOND, f64::NAN).await.is_err());
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_does_not_stop_the_loop() {
        let source = ScriptedSource::new(vec![
            Ok(vec![Ok(strong("BONK"))]),
            Err(Error::Fetch("rpc unavailable".to_string())),
            Ok(vec![Ok(strong("WIF"))]),
        ]);
        let executor = Recorder::new();
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(source.clone(), executor.clone())
            .with_sink(Arc::new(sink.clone()));

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        tokio::time::sleep(35 * SECOND).await;

        assert_eq!(source.fetches(), 3);
        assert_eq!(executor.calls(), 2);
        assert!(scheduler.is_running().await);
        assert!(sink.contains("Error updating observations"));
        assert!(sink.contains("No observations this tick"));
        assert!(sink.contains("executed WIF"));
        // the failed fetch left tick 1's batch in place until tick 3 replaced it
        assert_eq!(scheduler.last_batch().await[0].id, "WIF");
        let report = scheduler.last_report().await.expect("tick 3 reported");
        assert_eq!(report.fetched, 1);
        assert_eq!(report.outcome, TickOutcome::Executed);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_defers_next_tick_past_reset() {
        let reset_at = Utc::now() + chrono::Duration::minutes(10);
        let source = ScriptedSource::new(vec![]);
        let executor = Recorder::rate_limited_once(RateLimit {
            reset_at: Some(reset_at),
            remaining: Some(0),
            limit: Some(17),
        });
        let sink = MemorySink::new();
        let scheduler = Scheduler::new(source.clone(), executor.clone())
            .with_sink(Arc::new(sink.clone()))
            .with_schedule(ScheduleConfig::for_variant(crate::config::Variant::Posting));

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        tokio::time::sleep(15 * SECOND).await;

        assert_eq!(executor.calls(), 1);
        let state = scheduler.state().await;
        let buffer = chrono::Duration::minutes(1);
        assert!(state.next_fire_at.unwrap() >= reset_at + buffer);
        assert!(sink.contains("Rate limit hit"));

        // the normal 10s cadence would have ticked ~30 times by now
        tokio::time::sleep(5 * 60 * SECOND).await;
        assert_eq!(source.fetches(), 1);

        // deferred tick lands at ~11m10s; the 10s cadence resumes after it
        tokio::time::sleep(6 * 60 * SECOND).await;
        assert_eq!(source.fetches(), 2);
        assert_eq!(executor.calls(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_tick() {
        let source = ScriptedSource::new(vec![]);
        let scheduler = Scheduler::new(source.clone(), Recorder::new());

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        tokio::time::sleep(15 * SECOND).await;
        assert_eq!(source.fetches(), 1);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.state().await, ScheduleState::default());

        tokio::time::sleep(60 * SECOND).await;
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_tick_finish() {
        let source = Arc::new(GatedSource {
            release: Notify::new(),
            entered: Notify::new(),
        });
        let executor = Recorder::new();
        let scheduler = Scheduler::new(source.clone(), executor.clone());

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        source.entered.notified().await;

        scheduler.stop().await;
        source.release.notify_one();
        tokio::time::sleep(SECOND).await;

        // the suspended tick completed its action, and no further tick began
        assert_eq!(executor.calls(), 1);
        tokio::time::sleep(60 * SECOND).await;
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_in_flight_tick() {
        let source = Arc::new(SlowSource::default());
        let executor = Recorder::new();
        let scheduler = Scheduler::new(source.clone(), executor.clone());

        // first tick starts at 1s and fetches until 61s
        scheduler.start(SECOND, 0.6).await.unwrap();
        tokio::time::sleep(2 * SECOND).await;
        scheduler.stop().await;
        scheduler.start(SECOND, 0.6).await.unwrap();

        tokio::time::sleep(5 * SECOND).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // the old tick finishes, then the new loop runs its first tick
        tokio::time::sleep(60 * SECOND).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        // the newer batch is never overwritten by the stopped loop's tick
        tokio::time::sleep(60 * SECOND).await;
        assert_eq!(scheduler.last_batch().await[0].id, "T1");
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let source = ScriptedSource::new(vec![]);
        let scheduler = Scheduler::new(source.clone(), Recorder::new());

        scheduler.start(10 * SECOND, 0.6).await.unwrap();
        scheduler.stop().await;
        scheduler.start(20 * SECOND, 0.6).await.unwrap();

        let state = scheduler.state().await;
        assert!(state.running);
        assert_eq!(state.tick_interval, 20 * SECOND);

        tokio::time::sleep(25 * SECOND).await;
        assert_eq!(source.fetches(), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_instances_do_not_share_state() {
        let trading_source = ScriptedSource::new(vec![]);
        let posting_source = ScriptedSource::new(vec![]);
        let trading = Scheduler::new(trading_source.clone(), Recorder::new());
        let posting = Scheduler::new(posting_source.clone(), Recorder::new());

        trading.start(10 * SECOND, 0.6).await.unwrap();
        posting.start(60 * SECOND, 0.6).await.unwrap();
        tokio::time::sleep(65 * SECOND).await;

        assert_eq!(trading_source.fetches(), 6);
        assert_eq!(posting_source.fetches(), 1);

        trading.stop().await;
        assert!(posting.is_running().await);
        posting.stop().await;
    }
}
