// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable coordinator state for crash recovery.
//!
//! One table per keyed collection: claims by fingerprint, reservations by
//! id, heartbeats and clones by clone id, plus the pool balance. Restoring a
//! snapshot reinstates every table exactly; expired claim locks are kept and
//! lapse lazily like any other lock.

use crate::domain::claim::ClaimLock;
use crate::domain::clone::TradingClone;
use crate::domain::heartbeat::HeartbeatRecord;
use crate::domain::ledger::{PoolState, Reservation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub taken_at: DateTime<Utc>,
    pub claims: Vec<ClaimLock>,
    pub reservations: Vec<Reservation>,
    pub pool: PoolState,
    pub heartbeats: Vec<HeartbeatRecord>,
    /// Clone table; genomes and their lineage travel with each clone.
    pub clones: Vec<TradingClone>,
}

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

impl CoordinatorSnapshot {
    pub fn held_reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_held())
    }

    /// Sum of held reservation amounts; must equal `pool.committed`.
    pub fn held_total(&self) -> f64 {
        self.held_reservations().map(|r| r.amount).sum()
    }
}
