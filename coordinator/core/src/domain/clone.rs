// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Clone Aggregate
//!
//! One autonomous trading agent instance. Clones reference their parent by
//! id only; the parent link is informational and never implies ownership.
//!
//! ## Lifecycle
//!
//! ```text
//! spawning ──heartbeat──▶ active ◀──heartbeat── degraded
//!                           │                      ▲
//!                           └──missed < k──────────┘
//!            active|degraded ──missed ≥ k──▶ suspected
//!            suspected ──coverage ≥ threshold──▶ active
//!            suspected ──coverage < threshold──▶ retired (terminal)
//! ```

use crate::domain::genome::Genome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric clone identifier. Wave assignment is `id mod wave_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CloneId(pub u64);

impl fmt::Display for CloneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clone-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneStatus {
    Spawning,
    Active,
    Degraded,
    Suspected,
    Retired,
}

impl CloneStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Spawning | Self::Active | Self::Degraded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Retired)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CloneError {
    #[error("clone {id} cannot move from {from:?} to {to:?}")]
    InvalidStateTransition {
        id: CloneId,
        from: CloneStatus,
        to: CloneStatus,
    },

    #[error("clone {0} not found")]
    NotFound(CloneId),

    #[error("clone {0} is retired")]
    Retired(CloneId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingClone {
    pub id: CloneId,
    pub parent_id: Option<CloneId>,
    pub generation: u32,
    /// Capital currently held in live reservations.
    pub capital_allocation: f64,
    pub genome: Genome,
    pub status: CloneStatus,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    /// Number of successful resurrections.
    pub resurrections: u32,
}

impl TradingClone {
    pub fn new(
        id: CloneId,
        parent_id: Option<CloneId>,
        generation: u32,
        genome: Genome,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            parent_id,
            generation,
            capital_allocation: 0.0,
            genome,
            status: CloneStatus::Spawning,
            created_at,
            retired_at: None,
            resurrections: 0,
        }
    }

    pub fn is_sibling_of(&self, other: &TradingClone) -> bool {
        self.id != other.id && self.parent_id.is_some() && self.parent_id == other.parent_id
    }

    fn transition(&mut self, to: CloneStatus, allowed: bool) -> Result<(), CloneError> {
        if !allowed {
            return Err(CloneError::InvalidStateTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// A heartbeat arrived for a spawning or degraded clone.
    pub fn mark_active(&mut self) -> Result<(), CloneError> {
        let allowed = matches!(
            self.status,
            CloneStatus::Spawning | CloneStatus::Active | CloneStatus::Degraded
        );
        self.transition(CloneStatus::Active, allowed)
    }

    pub fn mark_degraded(&mut self) -> Result<(), CloneError> {
        let allowed = matches!(self.status, CloneStatus::Active | CloneStatus::Degraded);
        self.transition(CloneStatus::Degraded, allowed)
    }

    pub fn mark_suspected(&mut self) -> Result<(), CloneError> {
        let allowed = self.status.is_live();
        self.transition(CloneStatus::Suspected, allowed)
    }

    /// Reconstruction succeeded. The clone keeps its own genome and lineage.
    pub fn mark_resurrected(&mut self) -> Result<(), CloneError> {
        self.transition(CloneStatus::Active, self.status == CloneStatus::Suspected)?;
        self.resurrections += 1;
        Ok(())
    }

    /// Retirement is terminal; explicit decommissioning is allowed from any
    /// non-retired state.
    pub fn mark_retired(&mut self, at: DateTime<Utc>) -> Result<(), CloneError> {
        if self.status.is_terminal() {
            return Err(CloneError::Retired(self.id));
        }
        self.status = CloneStatus::Retired;
        self.retired_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::genome::MutationPolicy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_clone(id: u64, parent: Option<u64>) -> TradingClone {
        let genome = Genome::random(&MutationPolicy::default(), &mut StdRng::seed_from_u64(id));
        TradingClone::new(CloneId(id), parent.map(CloneId), 1, genome, Utc::now())
    }

    #[test]
    fn test_new_clone_is_spawning() {
        let c = make_clone(1, None);
        assert_eq!(c.status, CloneStatus::Spawning);
        assert_eq!(c.capital_allocation, 0.0);
    }

    #[test]
    fn test_retired_is_terminal() {
        let mut c = make_clone(1, Some(0));
        c.mark_active().unwrap();
        c.mark_suspected().unwrap();
        c.mark_retired(Utc::now()).unwrap();

        assert!(c.mark_suspected().is_err());
        assert!(c.mark_active().is_err());
        assert_eq!(c.mark_retired(Utc::now()), Err(CloneError::Retired(CloneId(1))));
    }

    #[test]
    fn test_resurrection_requires_suspected() {
        let mut c = make_clone(2, Some(0));
        c.mark_active().unwrap();
        assert!(c.mark_resurrected().is_err());

        c.mark_suspected().unwrap();
        c.mark_resurrected().unwrap();
        assert_eq!(c.status, CloneStatus::Active);
        assert_eq!(c.resurrections, 1);
    }

    #[test]
    fn test_siblings_share_a_parent() {
        let a = make_clone(1, Some(0));
        let b = make_clone(2, Some(0));
        let c = make_clone(3, Some(9));
        let root = make_clone(4, None);
        let other_root = make_clone(5, None);

        assert!(a.is_sibling_of(&b));
        assert!(!a.is_sibling_of(&c));
        assert!(!a.is_sibling_of(&a));
        assert!(!root.is_sibling_of(&other_root));
    }
}
