// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot inspection commands
//!
//! Commands: show

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use swarm_core::domain::repository::SnapshotRepository;
use swarm_core::domain::snapshot::CoordinatorSnapshot;
use swarm_core::infrastructure::FileSnapshotRepository;

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Summarize a snapshot file
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Dump the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: SnapshotCommand) -> Result<()> {
    match command {
        SnapshotCommand::Show { file, json } => show(file, json).await,
    }
}

async fn show(file: PathBuf, as_json: bool) -> Result<()> {
    let repository = FileSnapshotRepository::new(&file);
    let snapshot = repository
        .load()
        .await
        .with_context(|| format!("Failed to read snapshot {:?}", file))?
        .with_context(|| format!("No snapshot at {:?}", file))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    print_summary(&snapshot);
    Ok(())
}

fn print_summary(snapshot: &CoordinatorSnapshot) {
    println!(
        "{} (format v{}, taken {})",
        "Coordinator snapshot".bold(),
        snapshot.format_version,
        snapshot.taken_at.to_rfc3339()
    );
    println!();

    let pool = &snapshot.pool;
    println!("{}", "Capital pool:".bold());
    println!("  Balance: {:.2} ({:?})", pool.total_balance, pool.phase());
    println!("  Committed: {:.2}, available: {:.2}", pool.committed, pool.available());
    let held = snapshot.held_total();
    if (held - pool.committed).abs() > 1e-6 {
        println!(
            "  {}",
            format!("Held reservations sum to {:.2}, expected {:.2}", held, pool.committed).red()
        );
    }
    if pool.halted {
        println!("  {}", "HALTED".red().bold());
    }
    println!(
        "  Reservations: {} total, {} held",
        snapshot.reservations.len(),
        snapshot.held_reservations().count()
    );
    println!();

    println!("{}", "Claims:".bold());
    if snapshot.claims.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for lock in &snapshot.claims {
        println!("  {} → {} until {}", lock.fingerprint, lock.holder, lock.expires_at().to_rfc3339());
    }
    println!();

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for clone in &snapshot.clones {
        *by_status.entry(format!("{:?}", clone.status).to_lowercase()).or_default() += 1;
    }
    println!("{}", "Clones:".bold());
    for (status, count) in &by_status {
        println!("  {}: {}", status, count);
    }
    println!("  Heartbeat records: {}", snapshot.heartbeats.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swarm_core::application::{LoggingLauncher, SwarmCoordinator};
    use swarm_core::domain::clock::ManualClock;
    use swarm_core::domain::config::CoordinatorConfig;

    #[tokio::test]
    async fn test_show_persisted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.json");
        let coordinator = SwarmCoordinator::with_seed(
            &CoordinatorConfig::default(),
            Arc::new(ManualClock::default()),
            Arc::new(LoggingLauncher),
            3,
        );
        coordinator.register_root(None);
        coordinator.persist(&FileSnapshotRepository::new(&path)).await.unwrap();

        assert!(show(path.clone(), false).await.is_ok());
        assert!(show(path, true).await.is_ok());
        assert!(show(dir.path().join("absent.json"), false).await.is_err());
    }
}
