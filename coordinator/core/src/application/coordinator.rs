// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Coordinator
//!
//! Wires the claim registry, capital ledger, scheduler, knowledge network,
//! heartbeat and clone registries and the resurrection manager into one
//! in-process [`CoordinationService`], publishes domain events on the
//! [`EventBus`] and produces and restores crash-recovery snapshots.

use crate::application::capital_ledger::CapitalLedger;
use crate::application::claim_registry::ClaimRegistry;
use crate::application::clone_registry::CloneRegistry;
use crate::application::heartbeat_registry::HeartbeatRegistry;
use crate::application::knowledge_network::{KnowledgeNetwork, PropagationReport};
use crate::application::opportunity_book::OpportunityBook;
use crate::application::resurrection::{CloneLauncher, ResurrectionManager, ResurrectionSettings, SweepReport};
use crate::application::scheduler::{WaveScheduler, WaveSettings};
use crate::application::CoordinationService;
use crate::domain::claim::{ClaimDenial, ClaimOutcome};
use crate::domain::clock::Clock;
use crate::domain::clone::{CloneError, CloneId, TradingClone};
use crate::domain::config::CoordinatorConfig;
use crate::domain::error::CoordinatorError;
use crate::domain::events::{ClaimEvent, CloneLifecycleEvent, KnowledgeEvent};
use crate::domain::genome::{Gene, GeneValue, Genome};
use crate::domain::heartbeat::{HeartbeatOutcome, PartialStateSnapshot};
use crate::domain::knowledge::KnowledgeFragment;
use crate::domain::ledger::{ReservationId, ReservationResult, Settlement, TradingPhase};
use crate::domain::opportunity::{Fingerprint, Opportunity};
use crate::domain::repository::SnapshotRepository;
use crate::domain::snapshot::{CoordinatorSnapshot, SNAPSHOT_FORMAT_VERSION};
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Entries dropped by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub opportunities: usize,
    pub claims: usize,
    pub reservations: usize,
}

/// Point-in-time summary of the swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmStatus {
    pub total_balance: f64,
    pub committed: f64,
    pub available: f64,
    pub phase: TradingPhase,
    pub halted: bool,
    pub live_claims: usize,
    pub open_opportunities: usize,
    /// Clone counts keyed by lower-case status name.
    pub clones: BTreeMap<String, usize>,
    pub settled_trades: u64,
    pub winning_trades: u64,
    pub aborted_trades: u64,
    pub win_rate: f64,
    pub realized_pnl: f64,
}

pub struct SwarmCoordinator {
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    default_ttl: Duration,
    closed_retention: Duration,
    claims: Arc<ClaimRegistry>,
    opportunities: Arc<OpportunityBook>,
    ledger: Arc<CapitalLedger>,
    scheduler: WaveScheduler,
    knowledge: Arc<KnowledgeNetwork>,
    heartbeats: Arc<HeartbeatRegistry>,
    clones: Arc<CloneRegistry>,
    resurrection: Arc<ResurrectionManager>,
}

impl SwarmCoordinator {
    pub fn new(config: &CoordinatorConfig, clock: Arc<dyn Clock>, launcher: Arc<dyn CloneLauncher>) -> Self {
        Self::build(config, clock, launcher, None)
    }

    /// Coordinator whose random sources (mutation, jitter, gossip) are
    /// derived from `seed`.
    pub fn with_seed(
        config: &CoordinatorConfig,
        clock: Arc<dyn Clock>,
        launcher: Arc<dyn CloneLauncher>,
        seed: u64,
    ) -> Self {
        Self::build(config, clock, launcher, Some(seed))
    }

    fn build(
        config: &CoordinatorConfig,
        clock: Arc<dyn Clock>,
        launcher: Arc<dyn CloneLauncher>,
        seed: Option<u64>,
    ) -> Self {
        let rng = |offset: u64| match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(offset)),
            None => StdRng::from_os_rng(),
        };
        let spec = &config.spec;
        let event_bus = EventBus::with_default_capacity();

        let claims = Arc::new(ClaimRegistry::new(clock.clone()));
        let opportunities = Arc::new(OpportunityBook::new(clock.clone()));
        let ledger = Arc::new(CapitalLedger::new(
            spec.ledger.initial_balance,
            spec.ledger.discovery_bonus_fraction,
            claims.clone(),
            opportunities.clone(),
            clock.clone(),
            event_bus.clone(),
        ));
        let scheduler = WaveScheduler::with_rng(
            WaveSettings {
                wave_count: spec.scheduler.wave_count,
                wave_interval: spec.scheduler.wave_interval,
                override_threshold: spec.scheduler.override_threshold,
                max_jitter: spec.scheduler.max_jitter,
            },
            rng(1),
        );
        let knowledge = Arc::new(KnowledgeNetwork::with_rng(
            spec.knowledge.decay_model(),
            spec.knowledge.fanout,
            rng(2),
        ));
        let heartbeats = Arc::new(HeartbeatRegistry::new(clock.clone()));
        let clones = Arc::new(CloneRegistry::with_rng(
            spec.genome.mutation_policy(),
            clock.clone(),
            rng(3),
        ));
        let resurrection = Arc::new(ResurrectionManager::new(
            ResurrectionSettings {
                heartbeat_interval: spec.resurrection.heartbeat_interval,
                missed_heartbeat_limit: spec.resurrection.missed_heartbeat_limit,
                resurrection_threshold: spec.resurrection.resurrection_threshold,
                sweep_interval: spec.resurrection.sweep_interval,
            },
            heartbeats.clone(),
            clones.clone(),
            ledger.clone(),
            knowledge.clone(),
            launcher,
            clock.clone(),
            event_bus.clone(),
        ));

        info!(
            swarm = %config.metadata.name,
            initial_balance = spec.ledger.initial_balance,
            wave_count = spec.scheduler.wave_count,
            "Swarm coordinator initialized"
        );

        Self {
            clock,
            event_bus,
            default_ttl: spec.claims.default_ttl,
            closed_retention: spec.ledger.closed_retention,
            claims,
            opportunities,
            ledger,
            scheduler,
            knowledge,
            heartbeats,
            clones,
            resurrection,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    pub fn ledger(&self) -> &CapitalLedger {
        &self.ledger
    }

    pub fn clones(&self) -> &CloneRegistry {
        &self.clones
    }

    pub fn heartbeats(&self) -> &HeartbeatRegistry {
        &self.heartbeats
    }

    pub fn knowledge(&self) -> &KnowledgeNetwork {
        &self.knowledge
    }

    pub fn resurrection(&self) -> Arc<ResurrectionManager> {
        self.resurrection.clone()
    }

    /// Accept an opportunity from the market-data collaborator.
    pub fn submit_opportunity(&self, opportunity: Opportunity) -> bool {
        let fingerprint = opportunity.fingerprint.clone();
        let accepted = self.opportunities.submit(opportunity);
        debug!(%fingerprint, accepted, "Opportunity submitted");
        accepted
    }

    pub fn opportunity(&self, fingerprint: &Fingerprint) -> Option<Opportunity> {
        self.opportunities.get(fingerprint)
    }

    pub fn register_root(&self, genome: Option<Genome>) -> TradingClone {
        let clone = self.clones.register_root(genome);
        self.publish_spawned(&clone, 0);
        clone
    }

    /// Spawn and register a child of `parent_id`. Triggered by the external
    /// capital-threshold signal.
    pub fn spawn_clone(&self, parent_id: CloneId) -> Result<TradingClone, CoordinatorError> {
        let parent_mutations = self
            .clones
            .get(parent_id)
            .map(|p| p.genome.mutation_lineage.len())
            .unwrap_or(0);
        let child = self.clones.spawn_child(parent_id)?;
        let mutations = child.genome.mutation_lineage.len().saturating_sub(parent_mutations);
        self.publish_spawned(&child, mutations);
        Ok(child)
    }

    fn publish_spawned(&self, clone: &TradingClone, mutations: usize) {
        self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneSpawned {
            clone_id: clone.id,
            parent_id: clone.parent_id,
            generation: clone.generation,
            mutations,
            spawned_at: clone.created_at,
        });
    }

    pub fn record_mutation(&self, clone_id: CloneId, gene: Gene, value: GeneValue) -> Result<(), CoordinatorError> {
        self.clones.record_mutation(clone_id, gene, value)
    }

    /// Explicitly retire a clone and return every reservation it held.
    pub fn decommission(&self, clone_id: CloneId) -> Result<(usize, f64), CoordinatorError> {
        let now = self.clock.now();
        let status = self
            .clones
            .status_of(clone_id)
            .ok_or(CloneError::NotFound(clone_id))?;
        if status.is_terminal() {
            return Err(CloneError::Retired(clone_id).into());
        }
        let (aborted_reservations, returned_capital) = self.ledger.abort_all_for(clone_id)?;
        self.clones.update(clone_id, |c| c.mark_retired(now))?;
        self.clones.set_capital_allocation(clone_id, 0.0);
        self.knowledge.forget(clone_id);
        self.heartbeats.remove(clone_id);
        info!(%clone_id, aborted_reservations, returned_capital, "Clone decommissioned");
        self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneRetired {
            clone_id,
            coverage: 0.0,
            aborted_reservations,
            returned_capital,
            retired_at: now,
        });
        Ok((aborted_reservations, returned_capital))
    }

    /// One maintenance pass: resurrection sweep, then housekeeping.
    pub async fn sweep(&self) -> Result<SweepReport, CoordinatorError> {
        let report = self.resurrection.sweep().await?;
        self.prune_expired();
        Ok(report)
    }

    /// Discard opportunities past their deadline, expired claim entries and
    /// closed reservations older than the retention window.
    pub fn prune_expired(&self) -> PruneReport {
        let report = PruneReport {
            opportunities: self.opportunities.prune_expired(),
            claims: self.claims.purge_expired(),
            reservations: self.ledger.prune_closed(self.closed_retention),
        };
        if report != PruneReport::default() {
            debug!(
                opportunities = report.opportunities,
                claims = report.claims,
                reservations = report.reservations,
                "Expired entries pruned"
            );
        }
        report
    }

    /// Sweep every `sweep_interval` until `cancel` fires.
    pub async fn run_monitor(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.resurrection.settings().sweep_interval;
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(?interval, "Swarm monitor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if !report.suspected.is_empty() || !report.degraded.is_empty() => {
                            debug!(
                                degraded = report.degraded.len(),
                                suspected = report.suspected.len(),
                                failed = report.failed.len(),
                                "Sweep complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!("Sweep failed: {}", e),
                    }
                }
            }
        }
        info!("Swarm monitor stopped");
    }

    /// Clones a fragment can reach: live and known to the heartbeat registry.
    pub fn reachable_clones(&self) -> Vec<CloneId> {
        self.clones
            .live_ids()
            .into_iter()
            .filter(|id| self.heartbeats.get(*id).is_some())
            .collect()
    }

    fn refresh_allocation(&self, clone_id: CloneId) {
        self.clones
            .set_capital_allocation(clone_id, self.ledger.committed_by(clone_id));
    }

    pub fn status(&self) -> SwarmStatus {
        let pool = self.ledger.pool();
        let stats = self.ledger.stats();
        SwarmStatus {
            total_balance: pool.total_balance,
            committed: pool.committed,
            available: pool.available(),
            phase: pool.phase(),
            halted: pool.halted,
            live_claims: self.claims.live_count(),
            open_opportunities: self.opportunities.len(),
            clones: self.clones.count_by_status(),
            settled_trades: stats.settled,
            winning_trades: stats.winning,
            aborted_trades: stats.aborted,
            win_rate: stats.win_rate(),
            realized_pnl: stats.realized_pnl,
        }
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: self.clock.now(),
            claims: self.claims.entries(),
            reservations: self.ledger.reservations(),
            pool: self.ledger.pool(),
            heartbeats: self.heartbeats.entries(),
            clones: self.clones.all(),
        }
    }

    /// Replace all coordinator tables with `snapshot`. The ledger tables are
    /// validated first; nothing is replaced if they are inconsistent.
    ///
    /// Every non-retired clone starts a fresh heartbeat window at restore
    /// time, so the coordinator's own downtime never counts as missed
    /// heartbeats.
    pub fn restore(&self, snapshot: CoordinatorSnapshot) -> Result<(), CoordinatorError> {
        self.ledger.restore(snapshot.pool, snapshot.reservations)?;
        self.claims.restore(snapshot.claims);
        self.heartbeats.restore(snapshot.heartbeats);
        self.clones.restore(snapshot.clones);

        let mut resumed = 0usize;
        for clone in self.clones.all() {
            if clone.status.is_terminal() {
                continue;
            }
            self.heartbeats.reset_liveness(clone.id);
            resumed += 1;
        }
        info!(taken_at = %snapshot.taken_at, resumed, "Coordinator state restored from snapshot");
        Ok(())
    }

    pub async fn persist(&self, repository: &dyn SnapshotRepository) -> Result<(), CoordinatorError> {
        repository.save(&self.snapshot()).await?;
        Ok(())
    }

    /// Restore from the repository's latest snapshot. Returns `false` when
    /// nothing was stored yet.
    pub async fn recover(&self, repository: &dyn SnapshotRepository) -> Result<bool, CoordinatorError> {
        match repository.load().await? {
            Some(snapshot) => {
                self.restore(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CoordinationService for SwarmCoordinator {
    async fn try_claim(&self, fingerprint: &Fingerprint, clone_id: CloneId, ttl: Duration) -> ClaimOutcome {
        let outcome = self.claims.try_claim(fingerprint, clone_id, ttl);
        let now = self.clock.now();
        let event = match &outcome {
            ClaimOutcome::Granted { expires_at, refreshed } => ClaimEvent::ClaimGranted {
                fingerprint: fingerprint.clone(),
                clone_id,
                refreshed: *refreshed,
                expires_at: *expires_at,
            },
            ClaimOutcome::Denied(ClaimDenial::AlreadyHeld { holder }) => ClaimEvent::ClaimDenied {
                fingerprint: fingerprint.clone(),
                clone_id,
                holder: *holder,
                denied_at: now,
            },
        };
        self.event_bus.publish_claim_event(event);
        outcome
    }

    async fn release(&self, fingerprint: &Fingerprint, clone_id: CloneId) {
        if self.claims.release(fingerprint, clone_id) {
            self.event_bus.publish_claim_event(ClaimEvent::ClaimReleased {
                fingerprint: fingerprint.clone(),
                clone_id,
                released_at: self.clock.now(),
            });
        }
    }

    async fn reserve(
        &self,
        clone_id: CloneId,
        fingerprint: &Fingerprint,
        amount: f64,
    ) -> Result<ReservationResult, CoordinatorError> {
        let result = self.ledger.reserve(clone_id, fingerprint, amount)?;
        if result.reservation_id().is_some() {
            self.refresh_allocation(clone_id);
        }
        Ok(result)
    }

    async fn settle(&self, reservation_id: ReservationId, realized_pnl: f64) -> Result<Settlement, CoordinatorError> {
        let settlement = self.ledger.settle(reservation_id, realized_pnl)?;
        if let Some(reservation) = self.ledger.reservation(reservation_id) {
            self.refresh_allocation(reservation.clone_id);
        }
        Ok(settlement)
    }

    async fn abort(&self, reservation_id: ReservationId) -> Result<f64, CoordinatorError> {
        let returned = self.ledger.abort(reservation_id)?;
        if let Some(reservation) = self.ledger.reservation(reservation_id) {
            self.refresh_allocation(reservation.clone_id);
        }
        Ok(returned)
    }

    async fn heartbeat(
        &self,
        clone_id: CloneId,
        snapshot: PartialStateSnapshot,
    ) -> Result<HeartbeatOutcome, CoordinatorError> {
        let status = self
            .clones
            .status_of(clone_id)
            .ok_or(CloneError::NotFound(clone_id))?;
        if status.is_terminal() {
            debug!(%clone_id, "Ignoring heartbeat from retired clone");
            return Ok(HeartbeatOutcome::Ignored);
        }

        let outcome = self.heartbeats.record(clone_id, snapshot);
        if outcome == HeartbeatOutcome::Recorded {
            match self.clones.on_heartbeat(clone_id) {
                Ok(Some(previous)) => {
                    debug!(%clone_id, ?previous, "Clone active");
                    self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneActivated {
                        clone_id,
                        activated_at: self.clock.now(),
                    });
                }
                Ok(None) => {}
                // Retired between the status check and the update
                Err(CloneError::Retired(_)) => return Ok(HeartbeatOutcome::Ignored),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(outcome)
    }

    async fn schedule_delay(&self, clone_id: CloneId, urgency_score: f64) -> Duration {
        self.scheduler.schedule_delay(clone_id, urgency_score)
    }

    async fn propagate(&self, fragment: KnowledgeFragment, max_distance: u32) -> PropagationReport {
        let reachable = self.reachable_clones();
        if !reachable.contains(&fragment.origin_clone_id) {
            warn!(origin = %fragment.origin_clone_id, "Propagating fragment from an unreachable clone");
        }
        let report = self.knowledge.propagate(fragment, max_distance, &reachable);
        self.event_bus.publish_knowledge_event(KnowledgeEvent::FragmentPropagated {
            fact_key: report.fact_key.clone(),
            origin_clone_id: report.origin_clone_id,
            deliveries: report.deliveries.len(),
            max_distance_reached: report.max_distance_reached,
            propagated_at: self.clock.now(),
        });
        report
    }

    async fn spawn(&self, parent_genome: &Genome, generation: u32) -> Genome {
        self.clones.spawn_genome(parent_genome, generation)
    }
}
