//! hydra CLI
//!
//! Single binary for all hydra roles:
//! - `run`: coordinator that spreads work items over the configured agents
//! - `sync`: mirror the source tree to ssh agents
//! - `agent` / `executor`: roles started by the coordinator, spoken over stdio

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hydra_cli::commands::{self, OutputMode};
use hydra_cli::output::print_error;

#[derive(Parser)]
#[command(name = "hydra")]
#[command(author, version, about = "Distributed test-file dispatcher")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors and the final summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run matching files across all configured agents
    Run {
        /// Show a progress bar instead of streaming failure output
        #[arg(short, long)]
        progress: bool,
        /// Files or glob patterns of work items
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Mirror the source tree to every ssh agent
    Sync,

    /// Agent role: boot executors and relay work over stdio
    #[command(hide = true)]
    Agent {
        /// Number of executors to boot
        #[arg(short, long, default_value_t = 1)]
        executors: usize,
        /// Command template run by each executor
        #[arg(long)]
        command: String,
        /// Seconds between heartbeats to the coordinator
        #[arg(long, default_value_t = 5)]
        heartbeat: u64,
    },

    /// Executor role: run assigned items over stdio
    #[command(hide = true)]
    Executor {
        /// Command template run for each item
        #[arg(long)]
        command: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // stdout carries the protocol for the agent and executor roles
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Run { progress, patterns } => {
            let mode = match (cli.quiet, progress) {
                (true, _) => OutputMode::Quiet,
                (false, true) => OutputMode::Progress,
                (false, false) => OutputMode::Minimal,
            };

            match run(cli.config.as_deref(), &patterns, mode).await {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    print_error(&format!("{:#}", e));
                    std::process::exit(2);
                }
            }
        }

        Commands::Sync => {
            let root = std::env::current_dir().context("Failed to read current directory")?;
            let config = commands::load_run_config(cli.config.as_deref(), &root)?;
            if !commands::sync_command(&config).await? {
                std::process::exit(1);
            }
        }

        Commands::Agent {
            executors,
            command,
            heartbeat,
        } => {
            commands::agent_role(executors, &command, Duration::from_secs(heartbeat.max(1)))
                .await?;
        }

        Commands::Executor { command } => {
            commands::executor_role(&command).await?;
        }
    }

    Ok(())
}

/// Load the configuration and run. Any error means the run could not
/// complete, as opposed to items failing.
async fn run(config: Option<&Path>, patterns: &[String], mode: OutputMode) -> Result<bool> {
    let root = std::env::current_dir().context("Failed to read current directory")?;
    let config = commands::load_run_config(config, &root)?;
    commands::run_command(config, patterns, mode).await
}
