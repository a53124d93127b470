// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capital Pool Ledger Types
//!
//! The pool is a protocol-level ledger: `total_balance`, `committed` (the sum
//! of held reservations) and the reservations themselves. The invariant
//! `committed ≤ total_balance` is checked on every mutation; a violation
//! halts the pool instead of being clamped.
//!
//! ## Reservation Lifecycle
//!
//! | From | Operation | To |
//! |------|-----------|----|
//! | `held` | `settle` | `committed` |
//! | `held` | `abort` | `released` |
//!
//! Both transitions are terminal. Any other request is a
//! [`LedgerError::ReservationConflict`].

use crate::domain::clone::CloneId;
use crate::domain::opportunity::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub Uuid);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    Held,
    Committed,
    Released,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub clone_id: CloneId,
    pub fingerprint: Fingerprint,
    pub amount: f64,
    pub state: ReservationState,
    /// Clone credited with the discovery bonus on settlement.
    pub discovered_by: CloneId,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<f64>,
}

impl Reservation {
    pub fn is_held(&self) -> bool {
        self.state == ReservationState::Held
    }
}

/// Trading phase derived from pool balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingPhase {
    /// Below 1,000.
    Micro,
    /// 1,000 to 10,000.
    Growth,
    /// 10,000 and above.
    Scale,
}

impl TradingPhase {
    pub fn for_balance(balance: f64) -> Self {
        if balance >= 10_000.0 {
            Self::Scale
        } else if balance >= 1_000.0 {
            Self::Growth
        } else {
            Self::Micro
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub total_balance: f64,
    pub committed: f64,
    /// Set once an invariant violation was detected; never cleared.
    #[serde(default)]
    pub halted: bool,
}

impl PoolState {
    pub fn new(total_balance: f64) -> Self {
        Self {
            total_balance,
            committed: 0.0,
            halted: false,
        }
    }

    pub fn available(&self) -> f64 {
        self.total_balance - self.committed
    }

    pub fn phase(&self) -> TradingPhase {
        TradingPhase::for_balance(self.total_balance)
    }

    /// Invariant: `0 ≤ committed ≤ total_balance`.
    pub fn check_invariant(&self) -> Result<(), LedgerError> {
        // Float accumulation tolerance; far below one unit of any currency.
        const EPSILON: f64 = 1e-9;
        if self.committed < -EPSILON || self.committed > self.total_balance + EPSILON {
            return Err(LedgerError::InvariantViolation {
                committed: self.committed,
                total_balance: self.total_balance,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ReservationDenial {
    NoClaim,
    InsufficientBalance { requested: f64, available: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReservationResult {
    Reserved { reservation_id: ReservationId },
    Denied(ReservationDenial),
}

impl ReservationResult {
    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            Self::Reserved { reservation_id } => Some(*reservation_id),
            Self::Denied(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    DiscoveryBonus,
    CapitalShare,
}

/// PnL attributed to one clone by a settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub clone_id: CloneId,
    pub kind: PayoutKind,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub reservation_id: ReservationId,
    pub fingerprint: Fingerprint,
    pub realized_pnl: f64,
    pub payouts: Vec<Payout>,
    pub pool: PoolState,
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("reservation {id} is {actual:?}, expected {expected:?}")]
    ReservationConflict {
        id: ReservationId,
        expected: ReservationState,
        actual: ReservationState,
    },

    #[error("reservation {0} not found")]
    UnknownReservation(ReservationId),

    #[error("invalid amount {0}: must be finite and positive")]
    InvalidAmount(f64),

    #[error("invalid realized pnl {0}: must be finite")]
    InvalidPnl(f64),

    #[error("pool invariant violated: committed {committed} > total balance {total_balance}")]
    InvariantViolation { committed: f64, total_balance: f64 },

    #[error("capital pool halted after an invariant violation")]
    PoolHalted,
}
