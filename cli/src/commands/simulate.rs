// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Seeded in-process swarm simulation
//!
//! Spawns a clone tree, lets clones race for synthetic opportunities through
//! the scheduler, claim registry and capital ledger, gossips what they find,
//! and optionally silences some clones to exercise resurrection.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use swarm_core::application::{
    CoordinationService, LoggingLauncher, ResurrectionOutcome, SwarmCoordinator, SwarmStatus,
};
use swarm_core::domain::claim::ClaimOutcome;
use swarm_core::domain::clock::{Clock, ManualClock};
use swarm_core::domain::clone::CloneId;
use swarm_core::domain::config::CoordinatorConfig;
use swarm_core::domain::heartbeat::{PartialStateSnapshot, SiblingCopy};
use swarm_core::domain::knowledge::KnowledgeFragment;
use swarm_core::domain::ledger::{ReservationDenial, ReservationResult};
use swarm_core::domain::opportunity::{Fingerprint, Opportunity};
use swarm_core::infrastructure::{EventBusError, EventReceiver};

const ASSETS: &[&str] = &["SOL/USDC", "JUP/USDC", "BONK/SOL", "WIF/USDC", "RAY/SOL"];

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Clones in the swarm, root included
    #[arg(long, default_value_t = 12)]
    pub clones: usize,

    /// Opportunities to discover
    #[arg(long, default_value_t = 50)]
    pub opportunities: usize,

    /// Clones racing for each opportunity
    #[arg(long, default_value_t = 3)]
    pub contenders: usize,

    /// Clones to silence after trading, exercising resurrection
    #[arg(long, default_value_t = 0)]
    pub kill: usize,

    /// Seed for every random source in the run
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SimulationReport {
    pub claims_granted: usize,
    pub claims_denied: usize,
    pub reservations_denied: usize,
    pub settled: usize,
    pub aborted: usize,
    pub fragments_delivered: usize,
    pub resurrected: Vec<CloneId>,
    pub retired: Vec<CloneId>,
    pub events: BTreeMap<&'static str, usize>,
    pub status: Option<SwarmStatus>,
}

pub async fn execute(args: SimulateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = CoordinatorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let report = run(&config, &args).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Run a full simulation against a fresh coordinator on a manual clock.
pub async fn run(config: &CoordinatorConfig, args: &SimulateArgs) -> Result<SimulationReport> {
    anyhow::ensure!(args.clones >= 1, "a swarm needs at least one clone");
    anyhow::ensure!(args.kill < args.clones, "cannot silence every clone");

    let clock = Arc::new(ManualClock::default());
    let coordinator = SwarmCoordinator::with_seed(config, clock.clone(), Arc::new(LoggingLauncher), args.seed);
    let mut events = coordinator.event_bus().subscribe();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut report = SimulationReport::default();

    let root = coordinator.register_root(None).id;
    let mut ids = vec![root];
    while ids.len() < args.clones {
        let parent = ids[rng.random_range(0..ids.len())];
        ids.push(coordinator.spawn_clone(parent)?.id);
    }
    info!(clones = ids.len(), seed = args.seed, "Swarm spawned");
    heartbeat_all(&coordinator, clock.as_ref(), &ids, &[], &mut rng).await?;

    let ttl = coordinator.default_ttl();
    for round in 0..args.opportunities {
        clock.advance(Duration::from_secs(1));
        let now = clock.now();
        let discoverer = ids[rng.random_range(0..ids.len())];
        let venue = coordinator
            .clones()
            .get(discoverer)
            .and_then(|c| c.genome.preferred_venues.first().cloned())
            .unwrap_or_else(|| "jupiter".to_string());
        let asset = ASSETS[rng.random_range(0..ASSETS.len())];
        let fingerprint = Fingerprint::compute(&venue, asset, "arbitrage", round as i64);
        let estimated_profit = rng.random_range(20.0..200.0);

        coordinator.submit_opportunity(Opportunity {
            fingerprint: fingerprint.clone(),
            discovered_by: discoverer,
            estimated_profit,
            discovery_time: now,
            deadline: now + chrono::TimeDelta::seconds(5),
        });
        let fragment = KnowledgeFragment::new(
            format!("{}:spread", asset),
            discoverer,
            now,
            serde_json::json!({ "fingerprint": fingerprint.as_str(), "estimated_profit": estimated_profit }),
            1.0,
        );
        report.fragments_delivered += coordinator.propagate(fragment, 4).await.deliveries.len();

        let mut contenders: Vec<CloneId> = ids.iter().copied().filter(|id| *id != discoverer).collect();
        contenders.shuffle(&mut rng);
        contenders.truncate(args.contenders.saturating_sub(1));
        contenders.push(discoverer);

        let mut timed = Vec::with_capacity(contenders.len());
        for clone_id in contenders {
            let urgency = rng.random_range(0.0..1.0);
            timed.push((coordinator.schedule_delay(clone_id, urgency).await, clone_id));
        }
        timed.sort();

        let mut winner = None;
        for (delay, clone_id) in timed {
            match coordinator.try_claim(&fingerprint, clone_id, ttl).await {
                ClaimOutcome::Granted { .. } => {
                    debug!(%clone_id, ?delay, "Won claim");
                    report.claims_granted += 1;
                    winner.get_or_insert(clone_id);
                }
                ClaimOutcome::Denied(_) => report.claims_denied += 1,
            }
        }

        if let Some(clone_id) = winner {
            let available = coordinator.ledger().pool().available();
            let amount = (available * rng.random_range(0.02..0.08)).max(1.0);
            match coordinator.reserve(clone_id, &fingerprint, amount).await? {
                ReservationResult::Reserved { reservation_id } => {
                    if rng.random_bool(0.1) {
                        coordinator.abort(reservation_id).await?;
                        report.aborted += 1;
                    } else {
                        let pnl = estimated_profit * rng.random_range(-0.6..1.0);
                        coordinator.settle(reservation_id, pnl).await?;
                        report.settled += 1;
                    }
                }
                ReservationResult::Denied(reason) => {
                    debug!(%clone_id, ?reason, "Reservation denied");
                    coordinator.release(&fingerprint, clone_id).await;
                    report.reservations_denied += 1;
                }
            }
        }

        if round % 10 == 9 {
            heartbeat_all(&coordinator, clock.as_ref(), &ids, &[], &mut rng).await?;
        }
        drain(&mut events, &mut report);
    }

    if args.kill > 0 {
        silence(&coordinator, clock.as_ref(), &ids, args.kill, &mut rng, &mut report).await?;
    }

    drain(&mut events, &mut report);
    report.status = Some(coordinator.status());
    Ok(report)
}

/// Every listed clone except `silent` heartbeats, carrying partial copies of
/// its siblings' state.
async fn heartbeat_all(
    coordinator: &SwarmCoordinator,
    clock: &ManualClock,
    ids: &[CloneId],
    silent: &[CloneId],
    rng: &mut StdRng,
) -> Result<()> {
    let now = clock.now();
    for &clone_id in ids.iter().filter(|id| !silent.contains(id)) {
        let mut snapshot = PartialStateSnapshot::at(now);
        for sibling in coordinator.clones().siblings_of(clone_id) {
            snapshot = snapshot.with_sibling_copy(
                sibling.id,
                SiblingCopy {
                    coverage: rng.random_range(0.15..0.45),
                    genome: Some(sibling.genome),
                    captured_at: now,
                },
            );
        }
        coordinator.heartbeat(clone_id, snapshot).await?;
    }
    Ok(())
}

async fn silence(
    coordinator: &SwarmCoordinator,
    clock: &ManualClock,
    ids: &[CloneId],
    kill: usize,
    rng: &mut StdRng,
    report: &mut SimulationReport,
) -> Result<()> {
    let mut victims: Vec<CloneId> = ids[1..].to_vec();
    victims.shuffle(rng);
    victims.truncate(kill);

    // Victims go down holding an open position
    for &clone_id in &victims {
        let fingerprint = Fingerprint::from(format!("open-position:{}", clone_id));
        coordinator.try_claim(&fingerprint, clone_id, Duration::from_secs(3_600)).await;
        let amount = coordinator.ledger().pool().available() * 0.05;
        if let ReservationResult::Denied(ReservationDenial::InsufficientBalance { .. }) =
            coordinator.reserve(clone_id, &fingerprint, amount.max(1.0)).await?
        {
            report.reservations_denied += 1;
        }
    }
    info!(victims = ?victims, "Silencing clones");

    let interval = coordinator.resurrection().settings().heartbeat_interval;
    let limit = coordinator.resurrection().settings().missed_heartbeat_limit;
    for _ in 0..limit {
        clock.advance(interval);
        heartbeat_all(coordinator, clock, ids, &victims, rng).await?;
    }

    let sweep = coordinator.sweep().await?;
    for outcome in sweep.outcomes {
        match outcome {
            ResurrectionOutcome::Resurrected { clone_id, .. } => report.resurrected.push(clone_id),
            ResurrectionOutcome::BelowThreshold { clone_id, .. } => report.retired.push(clone_id),
        }
    }
    Ok(())
}

fn drain(events: &mut EventReceiver, report: &mut SimulationReport) {
    loop {
        match events.try_recv() {
            Ok(event) => *report.events.entry(event.kind()).or_default() += 1,
            Err(EventBusError::Lagged(_)) => continue,
            Err(EventBusError::Empty) | Err(EventBusError::Closed) => break,
        }
    }
}

fn print_report(report: &SimulationReport) {
    println!("{}", "Simulation complete".bold());
    println!();

    println!("{}", "Contention:".bold());
    println!("  Claims granted: {}", report.claims_granted.to_string().green());
    println!("  Claims denied: {}", report.claims_denied.to_string().yellow());
    println!("  Reservations denied: {}", report.reservations_denied);
    println!("  Trades settled: {}, aborted: {}", report.settled, report.aborted);
    println!("  Knowledge deliveries: {}", report.fragments_delivered);
    println!();

    if !report.resurrected.is_empty() || !report.retired.is_empty() {
        println!("{}", "Resurrection:".bold());
        for id in &report.resurrected {
            println!("  {} clone {}", "resurrected".green(), id);
        }
        for id in &report.retired {
            println!("  {} clone {}", "retired".red(), id);
        }
        println!();
    }

    if let Some(status) = &report.status {
        println!("{}", "Capital pool:".bold());
        println!("  Balance: {:.2} ({:?})", status.total_balance, status.phase);
        println!("  Committed: {:.2}, available: {:.2}", status.committed, status.available);
        println!(
            "  Realized PnL: {:+.2}, win rate {:.0}%",
            status.realized_pnl,
            status.win_rate * 100.0
        );
        if status.halted {
            println!("  {}", "HALTED after invariant violation".red().bold());
        }
        println!();

        println!("{}", "Clones:".bold());
        for (state, count) in &status.clones {
            println!("  {}: {}", state, count);
        }
        println!();
    }

    println!("{}", "Events:".bold());
    for (kind, count) in &report.events {
        println!("  {}: {}", kind, count);
    }
    println!("{}", format!("Finished at {}", Utc::now().format("%H:%M:%S")).dimmed());
}
