//! Monitor Agent CLI
//!
//! Command-line host for the monitor loop: replays recorded observations
//! through the scheduler with a dry-run executor.

use clap::{Parser, Subcommand};
use monitor_agent::adapters::{DryRunExecutor, ReplaySource};
use monitor_agent::config::env::env_vars;
use monitor_agent::{
    select_best, Config, Error, Result, Scheduler, ScoringEngine, Supervisor, Variant,
};
use monitor_agent::{ObservationSource, Signal};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "monitor-agent")]
#[command(about = "Autonomous monitor, score and gated-action loop")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop until Ctrl-C
    Run {
        /// JSON array of observations, re-read every tick
        #[arg(short, long)]
        observations: PathBuf,

        /// Override the tick interval (milliseconds)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Override the gate threshold
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Loop shape preset (trading, posting)
        #[arg(long)]
        variant: Option<Variant>,

        /// Rate limit the dry-run executor to this many actions per day
        #[arg(long)]
        daily_quota: Option<u32>,
    },

    /// Score one batch and show which signal would be selected
    Score {
        /// JSON array of observations
        #[arg(short, long)]
        observations: PathBuf,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(cli.json.then(|| fmt::layer().json()))
        .with((!cli.json).then(fmt::layer))
        .with(filter)
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // CLI flags win over the environment; both go through one ordered pass so
    // a variant switch never discards an interval override
    config.apply_env(&cli_overrides(&cli.command))?;

    match cli.command {
        Commands::Run {
            observations,
            daily_quota,
            ..
        } => {
            run_loop(config, observations, daily_quota).await?;
        }
        Commands::Score { observations } => {
            score_batch(&config, observations).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn cli_overrides(command: &Commands) -> HashMap<&'static str, String> {
    let mut flags = HashMap::new();
    if let Commands::Run {
        interval_ms,
        min_confidence,
        variant,
        ..
    } = command
    {
        if let Some(variant) = variant {
            flags.insert(env_vars::VARIANT, variant.name().to_string());
        }
        if let Some(interval_ms) = interval_ms {
            flags.insert(env_vars::INTERVAL_MS, interval_ms.to_string());
        }
        if let Some(min_confidence) = min_confidence {
            flags.insert(env_vars::MIN_CONFIDENCE, min_confidence.to_string());
        }
    }
    flags
}

async fn run_loop(config: Config, observations: PathBuf, daily_quota: Option<u32>) -> Result<()> {
    tracing::info!(
        variant = config.variant.name(),
        interval_ms = config.schedule.interval_ms,
        min_confidence = config.gate.min_confidence,
        observations = %observations.display(),
        "Starting monitor agent"
    );

    let source = Arc::new(ReplaySource::new(&observations));
    let mut executor = DryRunExecutor::new();
    if let Some(limit) = daily_quota {
        executor = executor.with_quota(limit, chrono::Duration::hours(24));
    }

    let scheduler = Arc::new(Scheduler::from_config(
        &config,
        source.clone(),
        Arc::new(executor.clone()),
    ));
    let supervisor = Supervisor::new(source, scheduler.clone(), config.gate.min_confidence)
        .with_interval(Duration::from_millis(config.schedule.interval_ms));

    tokio::select! {
        started = supervisor.run() => {
            let attempts = started?;
            tracing::info!(attempts, "Monitor loop running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
        }
    }

    tracing::info!("Received Ctrl-C, shutting down");
    scheduler.stop().await;

    if let Some(report) = scheduler.last_report().await {
        tracing::info!(
            fetched = report.fetched,
            dropped = report.dropped,
            outcome = ?report.outcome,
            "Last tick"
        );
    }

    let executed = executor.executed().await;
    tracing::info!(actions = executed.len(), "Dry run finished");
    Ok(())
}

async fn score_batch(config: &Config, observations: PathBuf) -> Result<()> {
    let source = ReplaySource::new(&observations);
    let engine = ScoringEngine::new(config.scoring.clone());

    let mut signals: Vec<Signal> = Vec::new();
    for item in source.fetch_batch().await? {
        match item {
            Ok(observation) => signals.push(engine.score(&observation)),
            Err(e) => tracing::warn!(id = %e.id, reason = %e.reason, "Skipping observation"),
        }
    }

    let selected = select_best(signals.clone());
    let admitted = monitor_agent::admit(selected.clone(), config.gate.min_confidence);

    let report = serde_json::json!({
        "signals": signals,
        "selected": selected,
        "admitted": admitted.is_some(),
        "min_confidence": config.gate.min_confidence,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if signals.is_empty() {
        return Err(Error::Fetch(format!(
            "no usable observations in {}",
            observations.display()
        )));
    }
    Ok(())
}
