// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::domain::clone::CloneId;
use crate::domain::ledger::{ReservationId, TradingPhase};
use crate::domain::opportunity::Fingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClaimEvent {
    ClaimGranted {
        fingerprint: Fingerprint,
        clone_id: CloneId,
        refreshed: bool,
        expires_at: DateTime<Utc>,
    },
    ClaimDenied {
        fingerprint: Fingerprint,
        clone_id: CloneId,
        holder: CloneId,
        denied_at: DateTime<Utc>,
    },
    ClaimReleased {
        fingerprint: Fingerprint,
        clone_id: CloneId,
        released_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CapitalEvent {
    CapitalReserved {
        reservation_id: ReservationId,
        clone_id: CloneId,
        fingerprint: Fingerprint,
        amount: f64,
        reserved_at: DateTime<Utc>,
    },
    ReservationDenied {
        clone_id: CloneId,
        fingerprint: Fingerprint,
        amount: f64,
        reason: String,
        denied_at: DateTime<Utc>,
    },
    ReservationSettled {
        reservation_id: ReservationId,
        clone_id: CloneId,
        realized_pnl: f64,
        total_balance: f64,
        settled_at: DateTime<Utc>,
    },
    ReservationAborted {
        reservation_id: ReservationId,
        clone_id: CloneId,
        returned: f64,
        aborted_at: DateTime<Utc>,
    },
    PhaseTransition {
        from: TradingPhase,
        to: TradingPhase,
        total_balance: f64,
        transitioned_at: DateTime<Utc>,
    },
    PoolHalted {
        committed: f64,
        total_balance: f64,
        halted_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CloneLifecycleEvent {
    CloneSpawned {
        clone_id: CloneId,
        parent_id: Option<CloneId>,
        generation: u32,
        mutations: usize,
        spawned_at: DateTime<Utc>,
    },
    CloneActivated {
        clone_id: CloneId,
        activated_at: DateTime<Utc>,
    },
    CloneDegraded {
        clone_id: CloneId,
        missed_heartbeats: u32,
        degraded_at: DateTime<Utc>,
    },
    CloneSuspected {
        clone_id: CloneId,
        missed_heartbeats: u32,
        suspected_at: DateTime<Utc>,
    },
    CloneResurrected {
        clone_id: CloneId,
        coverage: f64,
        resurrected_at: DateTime<Utc>,
    },
    CloneRetired {
        clone_id: CloneId,
        coverage: f64,
        aborted_reservations: usize,
        returned_capital: f64,
        retired_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KnowledgeEvent {
    FragmentPropagated {
        fact_key: String,
        origin_clone_id: CloneId,
        deliveries: usize,
        max_distance_reached: u32,
        propagated_at: DateTime<Utc>,
    },
}

impl ClaimEvent {
    pub fn clone_id(&self) -> CloneId {
        match self {
            Self::ClaimGranted { clone_id, .. }
            | Self::ClaimDenied { clone_id, .. }
            | Self::ClaimReleased { clone_id, .. } => *clone_id,
        }
    }
}

impl CapitalEvent {
    pub fn clone_id(&self) -> Option<CloneId> {
        match self {
            Self::CapitalReserved { clone_id, .. }
            | Self::ReservationDenied { clone_id, .. }
            | Self::ReservationSettled { clone_id, .. }
            | Self::ReservationAborted { clone_id, .. } => Some(*clone_id),
            Self::PhaseTransition { .. } | Self::PoolHalted { .. } => None,
        }
    }
}

impl CloneLifecycleEvent {
    pub fn clone_id(&self) -> CloneId {
        match self {
            Self::CloneSpawned { clone_id, .. }
            | Self::CloneActivated { clone_id, .. }
            | Self::CloneDegraded { clone_id, .. }
            | Self::CloneSuspected { clone_id, .. }
            | Self::CloneResurrected { clone_id, .. }
            | Self::CloneRetired { clone_id, .. } => *clone_id,
        }
    }
}
