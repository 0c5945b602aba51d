//! materialflow - run a process model from the command line
//!
//! Reads a process model (JSON), starts it and feeds every line of standard
//! input to the orchestrator as a raw event. Lifecycle notifications are
//! written to standard output, one JSON object per line. The runner exits
//! when the process finishes, when input ends, or on Ctrl-C.

#![deny(unsafe_code)]

use clap::Parser;
use materialflow_engine::{
    init_tracing, EngineConfig, LifecycleEvent, Orchestrator, SchedulerHandle, SchedulerService,
};
use materialflow_types::Process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

mod error;

use error::{CliError, CliResult};

/// How often the runner checks for a process finished by a timer
const FINISH_POLL: Duration = Duration::from_millis(500);

/// materialflow CLI
#[derive(Parser)]
#[command(name = "materialflow")]
#[command(about = "Run a materialflow process, reading events from stdin", long_about = None)]
#[command(version)]
struct Cli {
    /// Process model (JSON)
    process: String,

    /// Configuration file path
    #[arg(short, long, env = "MATERIALFLOW_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "MATERIALFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MATERIALFLOW_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = EngineConfig::load(cli.config.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    init_tracing(&config.logging)?;

    let text = tokio::fs::read_to_string(&cli.process).await?;
    let process: Process = serde_json::from_str(&text)?;
    tracing::info!(path = %cli.process, tasks = process.tasks.len(), "Process loaded");

    let mut orchestrator = Orchestrator::new(&process, &config)?;
    orchestrator.add_listener(print_event);
    let handle = SchedulerService::spawn(orchestrator)?;

    let outcome = feed_stdin(&handle).await;
    let orchestrator = handle.shutdown().await?;
    outcome?;

    if orchestrator.is_finished() {
        tracing::info!("Process completed");
    } else {
        tracing::warn!(
            awaited = orchestrator.awaited_events().len(),
            "Stopped before the process finished"
        );
    }
    Ok(())
}

fn print_event(event: &LifecycleEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(event = event.name(), error = %e, "Notification not serializable"),
    }
}

/// Forward stdin lines until the process finishes or input ends
async fn feed_stdin(handle: &SchedulerHandle) -> CliResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(FINISH_POLL);

    loop {
        if handle.snapshot().await?.finished {
            return Ok(());
        }
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Input closed");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match handle.fire_raw(line.as_str()).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(input = %line, "Event not accepted"),
                    Err(e) => tracing::error!(input = %line, error = %e, "Event failed"),
                }
            }
            _ = poll.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return Ok(());
            }
        }
    }
}
