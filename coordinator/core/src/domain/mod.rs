// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Pure types of the swarm coordination core: no locking, no I/O.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `clock` | injected time source |
//! | `opportunity` | fingerprints and opportunities |
//! | `claim` | claim locks and claim outcomes |
//! | `ledger` | capital pool, reservations, settlements |
//! | `clone` | clone aggregate and lifecycle |
//! | `genome` | behavioral genome and the spawn protocol |
//! | `heartbeat` | heartbeat records and partial state snapshots |
//! | `knowledge` | knowledge fragments and fidelity decay |
//! | `events` | domain events |
//! | `snapshot` | persisted coordinator state |
//! | `repository` | snapshot persistence contract |
//! | `config` | coordinator configuration manifest |
//! | `error` | umbrella coordinator error |

pub mod claim;
pub mod clock;
pub mod clone;
pub mod config;
pub mod error;
pub mod events;
pub mod genome;
pub mod heartbeat;
pub mod knowledge;
pub mod ledger;
pub mod opportunity;
pub mod repository;
pub mod snapshot;

pub use claim::{ClaimDenial, ClaimLock, ClaimOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use clone::{CloneError, CloneId, CloneStatus, TradingClone};
pub use config::CoordinatorConfig;
pub use error::CoordinatorError;
pub use genome::{spawn, spawn_seeded, Gene, GeneValue, Genome, GenomeError, MutationEvent, MutationPolicy};
pub use heartbeat::{HeartbeatOutcome, HeartbeatRecord, PartialStateSnapshot, SiblingCopy};
pub use knowledge::{DecayModel, KnowledgeFragment};
pub use ledger::{
    LedgerError, Payout, PayoutKind, PoolState, Reservation, ReservationDenial, ReservationId,
    ReservationResult, ReservationState, Settlement, TradingPhase,
};
pub use opportunity::{Fingerprint, Opportunity};
pub use snapshot::CoordinatorSnapshot;
