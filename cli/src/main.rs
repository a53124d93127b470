// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Swarm Coordinator CLI
//!
//! The `swarmctl` binary hosts a swarm coordinator and inspects its state.
//!
//! ## Commands
//!
//! - `swarmctl run` - Host the coordinator until interrupted, snapshotting periodically
//! - `swarmctl simulate` - Drive a seeded in-process swarm and print the outcome
//! - `swarmctl snapshot show FILE` - Summarize a crash-recovery snapshot
//! - `swarmctl config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use swarm_coordinator::commands::{self, ConfigCommand, SimulateArgs, SnapshotCommand};

/// Swarm coordinator - claims, capital, liveness and knowledge for trading clones
#[derive(Parser)]
#[command(name = "swarmctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SWARM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SWARM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the coordinator until Ctrl+C or SIGTERM
    #[command(name = "run")]
    Run,

    /// Simulate a swarm competing for opportunities
    #[command(name = "simulate")]
    Simulate(SimulateArgs),

    /// Crash-recovery snapshot inspection
    #[command(name = "snapshot")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Run) => commands::run::execute(cli.config).await,
        Some(Commands::Simulate(args)) => commands::simulate::execute(args, cli.config).await,
        Some(Commands::Snapshot { command }) => commands::snapshot::handle_command(command).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
