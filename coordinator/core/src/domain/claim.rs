// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Claim Locks
//!
//! A [`ClaimLock`] is the exclusive, TTL-bounded right for one clone to act on
//! a fingerprint. At most one live lock exists per fingerprint; expiry is
//! evaluated lazily whenever the lock is looked at.

use crate::domain::clock::to_time_delta;
use crate::domain::clone::CloneId;
use crate::domain::opportunity::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLock {
    pub fingerprint: Fingerprint,
    pub holder: CloneId,
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl ClaimLock {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + to_time_delta(self.ttl)
    }

    /// Live on `[acquired_at, acquired_at + ttl)`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    pub fn is_held_by(&self, clone_id: CloneId, now: DateTime<Utc>) -> bool {
        self.holder == clone_id && self.is_live(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ClaimDenial {
    AlreadyHeld { holder: CloneId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Granted {
        expires_at: DateTime<Utc>,
        /// The caller already held the lock and its TTL was refreshed.
        refreshed: bool,
    },
    Denied(ClaimDenial),
}

impl ClaimOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    pub fn holder(&self) -> Option<CloneId> {
        match self {
            Self::Denied(ClaimDenial::AlreadyHeld { holder }) => Some(*holder),
            Self::Granted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_live_until_exactly_ttl() {
        let t = Utc::now();
        let lock = ClaimLock {
            fingerprint: "H1".into(),
            holder: CloneId(1),
            acquired_at: t,
            ttl: Duration::from_secs(5),
        };
        let epsilon = chrono::TimeDelta::milliseconds(1);
        let ttl = chrono::TimeDelta::seconds(5);

        assert!(lock.is_live(t));
        assert!(lock.is_live(t + ttl - epsilon));
        assert!(!lock.is_live(t + ttl));
        assert!(lock.is_held_by(CloneId(1), t));
        assert!(!lock.is_held_by(CloneId(2), t));
    }
}
