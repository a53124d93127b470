// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resurrection Manager
//!
//! Watches heartbeats and rebuilds or retires clones that go silent.
//!
//! A sweep runs in two passes. The first pass classifies every non-retired
//! clone by missed heartbeat intervals: `1 ≤ missed < k` degrades an active
//! clone, `missed ≥ k` suspects it. The second pass reconstructs each
//! suspected clone from the partial copies its live siblings report:
//!
//! - summed coverage ≥ `resurrection_threshold`: the clone is restarted
//!   through the [`CloneLauncher`] with the reconstructed genome and keeps
//!   its reservations;
//! - otherwise its reservations are aborted and it is retired.
//!
//! Suspected siblings never vouch for each other: every suspect is marked
//! and its coverage measured before any reconstruction starts. A resurrected
//! clone keeps its own genome and lineage; a sibling's copy only contributes
//! lineage entries recorded after the registry's.

use crate::application::capital_ledger::CapitalLedger;
use crate::application::clone_registry::CloneRegistry;
use crate::application::heartbeat_registry::HeartbeatRegistry;
use crate::application::knowledge_network::KnowledgeNetwork;
use crate::domain::clock::Clock;
use crate::domain::clone::{CloneId, CloneStatus, TradingClone};
use crate::domain::error::CoordinatorError;
use crate::domain::events::CloneLifecycleEvent;
use crate::domain::genome::Genome;
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Restarts a clone process. Process management is an external concern.
#[async_trait]
pub trait CloneLauncher: Send + Sync {
    async fn relaunch(&self, clone: &TradingClone) -> anyhow::Result<()>;
}

/// Launcher that only records the restart in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLauncher;

#[async_trait]
impl CloneLauncher for LoggingLauncher {
    async fn relaunch(&self, clone: &TradingClone) -> anyhow::Result<()> {
        info!(clone_id = %clone.id, generation = clone.generation, "Relaunch requested");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResurrectionSettings {
    pub heartbeat_interval: Duration,
    pub missed_heartbeat_limit: u32,
    pub resurrection_threshold: f64,
    pub sweep_interval: Duration,
}

impl Default for ResurrectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            missed_heartbeat_limit: 3,
            resurrection_threshold: 0.7,
            sweep_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResurrectionOutcome {
    Resurrected {
        clone_id: CloneId,
        coverage: f64,
    },
    /// Coverage fell short; the clone was retired and its capital returned.
    BelowThreshold {
        clone_id: CloneId,
        coverage: f64,
        aborted_reservations: usize,
        returned_capital: f64,
    },
}

impl ResurrectionOutcome {
    pub fn clone_id(&self) -> CloneId {
        match self {
            Self::Resurrected { clone_id, .. } | Self::BelowThreshold { clone_id, .. } => *clone_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub degraded: Vec<CloneId>,
    pub suspected: Vec<CloneId>,
    pub outcomes: Vec<ResurrectionOutcome>,
    /// Suspects whose resolution failed; they stay suspected.
    #[serde(default)]
    pub failed: Vec<CloneId>,
}

pub struct ResurrectionManager {
    settings: ResurrectionSettings,
    heartbeats: Arc<HeartbeatRegistry>,
    clones: Arc<CloneRegistry>,
    ledger: Arc<CapitalLedger>,
    knowledge: Arc<KnowledgeNetwork>,
    launcher: Arc<dyn CloneLauncher>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl ResurrectionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: ResurrectionSettings,
        heartbeats: Arc<HeartbeatRegistry>,
        clones: Arc<CloneRegistry>,
        ledger: Arc<CapitalLedger>,
        knowledge: Arc<KnowledgeNetwork>,
        launcher: Arc<dyn CloneLauncher>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            settings,
            heartbeats,
            clones,
            ledger,
            knowledge,
            launcher,
            clock,
            event_bus,
        }
    }

    pub fn settings(&self) -> &ResurrectionSettings {
        &self.settings
    }

    fn missed_intervals(&self, clone: &TradingClone) -> u32 {
        let now = self.clock.now();
        match self.heartbeats.get(clone.id) {
            Some(record) => record.missed_intervals(now, self.settings.heartbeat_interval),
            None => {
                let interval_ms = self.settings.heartbeat_interval.as_millis().max(1) as i64;
                let elapsed_ms = (now - clone.created_at).num_milliseconds().max(0);
                u32::try_from(elapsed_ms / interval_ms).unwrap_or(u32::MAX)
            }
        }
    }

    /// Sum of the coverage live siblings hold for `id`, capped at 1, plus
    /// the genome from the most complete copy that carries one.
    pub fn coverage_of(&self, id: CloneId) -> (f64, Option<Genome>) {
        let mut coverage = 0.0;
        let mut best: Option<(f64, Genome)> = None;
        for sibling in self.clones.siblings_of(id) {
            if !sibling.status.is_live() {
                continue;
            }
            let Some(copy) = self.heartbeats.sibling_copy(sibling.id, id) else {
                continue;
            };
            let part = copy.coverage.clamp(0.0, 1.0);
            coverage += part;
            if let Some(genome) = copy.genome {
                if best.as_ref().is_none_or(|(c, _)| part > *c) {
                    best = Some((part, genome));
                }
            }
        }
        (coverage.min(1.0), best.map(|(_, g)| g))
    }

    pub async fn sweep(&self) -> Result<SweepReport, CoordinatorError> {
        let now = self.clock.now();
        let k = self.settings.missed_heartbeat_limit.max(1);
        let mut report = SweepReport::default();

        for clone in self.clones.all() {
            if clone.status.is_terminal() || clone.status == CloneStatus::Suspected {
                continue;
            }
            let missed = self.missed_intervals(&clone);
            if missed >= k {
                self.clones.update(clone.id, |c| c.mark_suspected())?;
                warn!(clone_id = %clone.id, missed, "Clone suspected after missed heartbeats");
                self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneSuspected {
                    clone_id: clone.id,
                    missed_heartbeats: missed,
                    suspected_at: now,
                });
                report.suspected.push(clone.id);
            } else if missed >= 1 && clone.status == CloneStatus::Active {
                self.clones.update(clone.id, |c| c.mark_degraded())?;
                debug!(clone_id = %clone.id, missed, "Clone degraded");
                self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneDegraded {
                    clone_id: clone.id,
                    missed_heartbeats: missed,
                    degraded_at: now,
                });
                report.degraded.push(clone.id);
            }
        }

        // Suspects left over from an interrupted sweep are retried too.
        // Coverage is fixed before any suspect changes status, so a clone
        // resurrected in this sweep never vouches for another suspect.
        let assessments: Vec<(CloneId, f64, Option<Genome>)> = self
            .clones
            .all()
            .into_iter()
            .filter(|c| c.status == CloneStatus::Suspected)
            .map(|c| {
                let (coverage, genome) = self.coverage_of(c.id);
                (c.id, coverage, genome)
            })
            .collect();
        for (id, coverage, genome) in assessments {
            match self.resolve(id, coverage, genome).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!(clone_id = %id, "Suspect left for the next sweep: {}", e);
                    report.failed.push(id);
                }
            }
        }
        Ok(report)
    }

    /// Resolve one suspected clone against its siblings' current copies.
    pub async fn reconstruct(&self, id: CloneId) -> Result<ResurrectionOutcome, CoordinatorError> {
        let (coverage, copied_genome) = self.coverage_of(id);
        self.resolve(id, coverage, copied_genome).await
    }

    async fn resolve(
        &self,
        id: CloneId,
        coverage: f64,
        copied_genome: Option<Genome>,
    ) -> Result<ResurrectionOutcome, CoordinatorError> {
        let now = self.clock.now();

        if coverage >= self.settings.resurrection_threshold {
            let clone = self.clones.update(id, |c| {
                c.mark_resurrected()?;
                if let Some(copy) = &copied_genome {
                    match c.genome.catch_up(copy) {
                        Ok(0) => {}
                        Ok(appended) => debug!(clone_id = %id, appended, "Genome caught up from sibling copy"),
                        Err(e) => warn!(clone_id = %id, "Sibling copy not applied: {}", e),
                    }
                }
                Ok(c.clone())
            })?;
            self.heartbeats.reset_liveness(id);
            if let Err(e) = self.launcher.relaunch(&clone).await {
                warn!(clone_id = %id, "Relaunch failed, clone will be swept again: {}", e);
            }
            info!(clone_id = %id, coverage, "Clone resurrected");
            metrics::counter!("swarm_resurrections_total", "outcome" => "resurrected").increment(1);
            self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneResurrected {
                clone_id: id,
                coverage,
                resurrected_at: now,
            });
            return Ok(ResurrectionOutcome::Resurrected { clone_id: id, coverage });
        }

        // Capital goes back before the clone turns terminal; a ledger
        // failure leaves it suspected and retried on the next sweep.
        let (aborted_reservations, returned_capital) = self.ledger.abort_all_for(id)?;
        self.clones.update(id, |c| c.mark_retired(now))?;
        self.clones.set_capital_allocation(id, 0.0);
        self.knowledge.forget(id);
        self.heartbeats.remove(id);

        warn!(
            clone_id = %id,
            coverage,
            threshold = self.settings.resurrection_threshold,
            aborted_reservations,
            returned_capital,
            "Resurrection below threshold, clone retired"
        );
        metrics::counter!("swarm_resurrections_total", "outcome" => "retired").increment(1);
        self.event_bus.publish_lifecycle_event(CloneLifecycleEvent::CloneRetired {
            clone_id: id,
            coverage,
            aborted_reservations,
            returned_capital,
            retired_at: now,
        });
        Ok(ResurrectionOutcome::BelowThreshold {
            clone_id: id,
            coverage,
            aborted_reservations,
            returned_capital,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::claim_registry::ClaimRegistry;
    use crate::application::opportunity_book::OpportunityBook;
    use crate::domain::clock::ManualClock;
    use crate::domain::genome::{Gene, GeneValue, MutationPolicy};
    use crate::domain::heartbeat::{PartialStateSnapshot, SiblingCopy};
    use crate::domain::knowledge::DecayModel;
    use crate::domain::opportunity::Fingerprint;
    use chrono::TimeDelta;

    struct Fixture {
        clock: Arc<ManualClock>,
        claims: Arc<ClaimRegistry>,
        heartbeats: Arc<HeartbeatRegistry>,
        clones: Arc<CloneRegistry>,
        ledger: Arc<CapitalLedger>,
        manager: ResurrectionManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let bus = EventBus::new(256);
        let claims = Arc::new(ClaimRegistry::new(clock.clone()));
        let book = Arc::new(OpportunityBook::new(clock.clone()));
        let heartbeats = Arc::new(HeartbeatRegistry::new(clock.clone()));
        let clones = Arc::new(CloneRegistry::with_seed(MutationPolicy::default(), clock.clone(), 4));
        let ledger = Arc::new(CapitalLedger::new(10_000.0, 0.1, claims.clone(), book, clock.clone(), bus.clone()));
        let knowledge = Arc::new(KnowledgeNetwork::with_seed(DecayModel::default(), 3, 4));
        let manager = ResurrectionManager::new(
            ResurrectionSettings::default(),
            heartbeats.clone(),
            clones.clone(),
            ledger.clone(),
            knowledge,
            Arc::new(LoggingLauncher),
            clock.clone(),
            bus,
        );
        Fixture { clock, claims, heartbeats, clones, ledger, manager }
    }

    fn beat(f: &Fixture, id: CloneId, copies: &[(CloneId, f64)]) {
        let mut snapshot = PartialStateSnapshot::at(f.clock.now());
        for (target, coverage) in copies {
            snapshot = snapshot.with_sibling_copy(
                *target,
                SiblingCopy {
                    coverage: *coverage,
                    genome: None,
                    captured_at: f.clock.now(),
                },
            );
        }
        f.heartbeats.record(id, snapshot);
        let _ = f.clones.on_heartbeat(id);
    }

    #[tokio::test]
    async fn test_single_missed_interval_degrades() {
        let f = fixture();
        let root = f.clones.register_root(None);
        beat(&f, root.id, &[]);
        f.clock.advance(Duration::from_secs(31));

        let report = f.manager.sweep().await.unwrap();
        assert_eq!(report.degraded, vec![root.id]);
        assert_eq!(f.clones.status_of(root.id), Some(CloneStatus::Degraded));

        f.clock.advance(Duration::from_secs(1));
        beat(&f, root.id, &[]);
        assert_eq!(f.clones.status_of(root.id), Some(CloneStatus::Active));
    }

    #[tokio::test]
    async fn test_coverage_is_capped_and_excludes_retired_siblings() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let e = f.clones.spawn_child(root.id).unwrap();
        let g1 = f.clones.spawn_child(root.id).unwrap();
        let g2 = f.clones.spawn_child(root.id).unwrap();
        beat(&f, g1.id, &[(e.id, 0.8)]);
        beat(&f, g2.id, &[(e.id, 0.6)]);

        assert_eq!(f.manager.coverage_of(e.id).0, 1.0);
        f.clones.update(g2.id, |c| c.mark_retired(f.clock.now())).unwrap();
        assert!((f.manager.coverage_of(e.id).0 - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_retirement_aborts_reservations() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let e = f.clones.spawn_child(root.id).unwrap();
        beat(&f, e.id, &[]);

        let fp = Fingerprint::from("H9");
        f.claims.try_claim(&fp, e.id, Duration::from_secs(600));
        f.ledger.reserve(e.id, &fp, 2_500.0).unwrap();
        assert_eq!(f.ledger.pool().committed, 2_500.0);

        f.clock.advance(Duration::from_secs(90));
        let report = f.manager.sweep().await.unwrap();
        let outcome = report.outcomes.iter().find(|o| o.clone_id() == e.id).unwrap();
        assert_eq!(
            *outcome,
            ResurrectionOutcome::BelowThreshold {
                clone_id: e.id,
                coverage: 0.0,
                aborted_reservations: 1,
                returned_capital: 2_500.0,
            }
        );
        assert_eq!(f.ledger.pool().committed, 0.0);
        assert_eq!(f.ledger.pool().total_balance, 10_000.0);
        assert_eq!(f.clones.status_of(e.id), Some(CloneStatus::Retired));
        assert_eq!(f.claims.holder_of(&fp), None);

        // Retired clones never re-enter suspected
        f.clock.advance(Duration::from_secs(300));
        let report = f.manager.sweep().await.unwrap();
        assert!(report.suspected.is_empty());
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_resurrection_catches_up_from_newer_copy() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let e = f.clones.spawn_child(root.id).unwrap();
        let g = f.clones.spawn_child(root.id).unwrap();
        beat(&f, e.id, &[]);

        f.clock.advance(Duration::from_secs(90));
        let mut copied = e.genome.clone();
        copied
            .apply_mutation(Gene::SizeVariance, GeneValue::Numeric(0.9), e.generation, f.clock.now())
            .unwrap();
        let snapshot = PartialStateSnapshot::at(f.clock.now()).with_sibling_copy(
            e.id,
            SiblingCopy {
                coverage: 0.75,
                genome: Some(copied.clone()),
                captured_at: f.clock.now() - TimeDelta::seconds(40),
            },
        );
        f.heartbeats.record(g.id, snapshot);
        f.clones.on_heartbeat(g.id).unwrap();

        let report = f.manager.sweep().await.unwrap();
        assert!(report.outcomes.contains(&ResurrectionOutcome::Resurrected {
            clone_id: e.id,
            coverage: 0.75,
        }));
        let resurrected = f.clones.get(e.id).unwrap();
        assert_eq!(resurrected.status, CloneStatus::Active);
        assert_eq!(resurrected.genome, copied);
        assert_eq!(resurrected.resurrections, 1);
        assert_eq!(f.heartbeats.get(e.id).unwrap().last_seen, f.clock.now());
    }

    #[tokio::test]
    async fn test_stale_copy_never_shortens_lineage() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let e = f.clones.spawn_child(root.id).unwrap();
        let g = f.clones.spawn_child(root.id).unwrap();
        beat(&f, e.id, &[]);
        let stale = f.clones.get(e.id).unwrap().genome;

        let current = f.clones.get(e.id).unwrap().genome.size_variance;
        f.clones
            .record_mutation(e.id, Gene::SizeVariance, GeneValue::Numeric(current + 0.05))
            .unwrap();
        let mutated = f.clones.get(e.id).unwrap().genome;
        assert_eq!(mutated.mutation_lineage.len(), stale.mutation_lineage.len() + 1);

        f.clock.advance(Duration::from_secs(90));
        let snapshot = PartialStateSnapshot::at(f.clock.now()).with_sibling_copy(
            e.id,
            SiblingCopy {
                coverage: 0.8,
                genome: Some(stale),
                captured_at: f.clock.now() - TimeDelta::seconds(60),
            },
        );
        f.heartbeats.record(g.id, snapshot);
        f.clones.on_heartbeat(g.id).unwrap();

        f.manager.sweep().await.unwrap();
        let resurrected = f.clones.get(e.id).unwrap();
        assert_eq!(resurrected.status, CloneStatus::Active);
        assert_eq!(resurrected.genome, mutated);
    }

    #[tokio::test]
    async fn test_suspects_do_not_vouch_for_each_other() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let a = f.clones.spawn_child(root.id).unwrap();
        let b = f.clones.spawn_child(root.id).unwrap();
        let v = f.clones.spawn_child(root.id).unwrap();
        // A last reported holding most of B, then both went silent.
        beat(&f, a.id, &[(b.id, 0.8)]);
        beat(&f, b.id, &[]);

        f.clock.advance(Duration::from_secs(90));
        beat(&f, v.id, &[(a.id, 0.8)]);

        let report = f.manager.sweep().await.unwrap();
        assert!(report.outcomes.contains(&ResurrectionOutcome::Resurrected {
            clone_id: a.id,
            coverage: 0.8,
        }));
        assert!(report.outcomes.contains(&ResurrectionOutcome::BelowThreshold {
            clone_id: b.id,
            coverage: 0.0,
            aborted_reservations: 0,
            returned_capital: 0.0,
        }));
        assert_eq!(f.clones.status_of(a.id), Some(CloneStatus::Active));
        assert_eq!(f.clones.status_of(b.id), Some(CloneStatus::Retired));
    }

    #[tokio::test]
    async fn test_halted_pool_keeps_suspect_and_finishes_sweep() {
        let f = fixture();
        let root = f.clones.register_root(None);
        let e = f.clones.spawn_child(root.id).unwrap();
        let other = f.clones.spawn_child(root.id).unwrap();
        beat(&f, e.id, &[]);
        beat(&f, other.id, &[]);

        let h1 = Fingerprint::from("H1");
        let h2 = Fingerprint::from("H2");
        f.claims.try_claim(&h1, e.id, Duration::from_secs(600));
        f.claims.try_claim(&h2, root.id, Duration::from_secs(600));
        f.ledger.reserve(e.id, &h1, 4_000.0).unwrap();
        let loser = f.ledger.reserve(root.id, &h2, 4_000.0).unwrap().reservation_id().unwrap();
        // A loss the pool cannot cover halts it.
        assert!(f.ledger.settle(loser, -9_000.0).is_err());
        assert!(f.ledger.pool().halted);

        f.clock.advance(Duration::from_secs(90));
        let report = f.manager.sweep().await.unwrap();
        assert!(report.failed.contains(&e.id));
        assert_eq!(f.clones.status_of(e.id), Some(CloneStatus::Suspected));
        assert_eq!(f.ledger.committed_by(e.id), 4_000.0);
        // The suspect without reservations is still resolved in the same sweep.
        assert_eq!(f.clones.status_of(other.id), Some(CloneStatus::Retired));
    }
}
