// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Linearizable coordination services and the [`CoordinationService`]
//! facade collaborators talk to.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Claim, capital, scheduling, knowledge and liveness use cases

pub mod capital_ledger;
pub mod claim_registry;
pub mod clone_registry;
pub mod coordinator;
pub mod heartbeat_registry;
pub mod knowledge_network;
pub mod opportunity_book;
pub mod resurrection;
pub mod scheduler;

pub use capital_ledger::{CapitalLedger, LedgerStats};
pub use claim_registry::ClaimRegistry;
pub use clone_registry::CloneRegistry;
pub use coordinator::{PruneReport, SwarmCoordinator, SwarmStatus};
pub use heartbeat_registry::HeartbeatRegistry;
pub use knowledge_network::{KnowledgeNetwork, PropagationReport};
pub use opportunity_book::OpportunityBook;
pub use resurrection::{CloneLauncher, LoggingLauncher, ResurrectionManager, ResurrectionOutcome, SweepReport};
pub use scheduler::{WaveScheduler, WaveSettings};

use crate::domain::claim::ClaimOutcome;
use crate::domain::clone::CloneId;
use crate::domain::error::CoordinatorError;
use crate::domain::genome::Genome;
use crate::domain::heartbeat::{HeartbeatOutcome, PartialStateSnapshot};
use crate::domain::knowledge::KnowledgeFragment;
use crate::domain::ledger::{ReservationId, ReservationResult, Settlement};
use crate::domain::opportunity::Fingerprint;
use async_trait::async_trait;
use std::time::Duration;

/// Operations the coordination core exposes to clones and other
/// collaborators. None of them wait on another clone: contention comes back
/// as a denial value.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    async fn try_claim(&self, fingerprint: &Fingerprint, clone_id: CloneId, ttl: Duration) -> ClaimOutcome;

    /// No-op unless `clone_id` holds the lock.
    async fn release(&self, fingerprint: &Fingerprint, clone_id: CloneId);

    async fn reserve(
        &self,
        clone_id: CloneId,
        fingerprint: &Fingerprint,
        amount: f64,
    ) -> Result<ReservationResult, CoordinatorError>;

    async fn settle(&self, reservation_id: ReservationId, realized_pnl: f64) -> Result<Settlement, CoordinatorError>;

    /// Returns the amount handed back to the pool.
    async fn abort(&self, reservation_id: ReservationId) -> Result<f64, CoordinatorError>;

    async fn heartbeat(
        &self,
        clone_id: CloneId,
        snapshot: PartialStateSnapshot,
    ) -> Result<HeartbeatOutcome, CoordinatorError>;

    async fn schedule_delay(&self, clone_id: CloneId, urgency_score: f64) -> Duration;

    async fn propagate(&self, fragment: KnowledgeFragment, max_distance: u32) -> PropagationReport;

    async fn spawn(&self, parent_genome: &Genome, generation: u32) -> Genome;
}
