// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running coordinator host
//!
//! Recovers from the configured snapshot, runs the sweep and housekeeping
//! monitor, and persists snapshots on every sweep interval and on shutdown.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use swarm_core::application::{LoggingLauncher, SwarmCoordinator};
use swarm_core::domain::clock::SystemClock;
use swarm_core::domain::config::CoordinatorConfig;
use swarm_core::infrastructure::FileSnapshotRepository;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = CoordinatorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let coordinator = Arc::new(SwarmCoordinator::new(
        &config,
        Arc::new(SystemClock),
        Arc::new(LoggingLauncher),
    ));

    let repository = config
        .spec
        .persistence
        .snapshot_path
        .as_ref()
        .map(FileSnapshotRepository::new);

    match &repository {
        Some(repository) => {
            let recovered = coordinator
                .recover(repository)
                .await
                .with_context(|| format!("Failed to recover from {:?}", repository.path()))?;
            if recovered {
                info!(path = ?repository.path(), "Recovered coordinator state");
            } else {
                info!(path = ?repository.path(), "No snapshot found, starting fresh");
            }
        }
        None => warn!("Snapshot persistence disabled; state will not survive a restart"),
    }

    let cancel = CancellationToken::new();
    let monitor = tokio::spawn(coordinator.clone().run_monitor(cancel.clone()));

    let persister = repository.clone().map(|repository| {
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        let period = config.spec.resurrection.sweep_interval.max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.persist(&repository).await {
                            error!("Snapshot failed: {}", e);
                        }
                    }
                }
            }
        })
    });

    println!(
        "{}",
        format!("✓ Swarm '{}' coordinator running (Ctrl+C to stop)", config.metadata.name).green()
    );

    shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = monitor.await {
        error!("Resurrection monitor task failed: {}", e);
    }
    if let Some(persister) = persister {
        if let Err(e) = persister.await {
            error!("Snapshot task failed: {}", e);
        }
    }

    if let Some(repository) = &repository {
        coordinator
            .persist(repository)
            .await
            .context("Failed to write final snapshot")?;
        info!(path = ?repository.path(), "Final snapshot written");
    }

    let status = coordinator.status();
    println!(
        "Stopped. Balance {:.2}, committed {:.2}, {} settled trades",
        status.total_balance, status.committed, status.settled_trades
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
