// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Opportunity Claim Registry
//!
//! Mutual exclusion keyed by opportunity fingerprint. The lock table sits
//! behind one mutex, which is the registry's serialization point: every
//! `try_claim` and `release` runs as a single critical section, so the
//! history of each fingerprint is totally ordered and simultaneous callers
//! are resolved by arrival order at the mutex.
//!
//! TTL expiry is evaluated lazily against the injected [`Clock`]; there is no
//! background sweeper. An expired entry stays in the table until the next
//! access of its fingerprint or [`ClaimRegistry::purge_expired`].

use crate::domain::claim::{ClaimDenial, ClaimLock, ClaimOutcome};
use crate::domain::clock::Clock;
use crate::domain::clone::CloneId;
use crate::domain::opportunity::Fingerprint;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

pub struct ClaimRegistry {
    locks: Mutex<HashMap<Fingerprint, ClaimLock>>,
    clock: Arc<dyn Clock>,
}

impl ClaimRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Grant the lock when no live lock exists or the caller already holds
    /// it (the TTL is then refreshed from now). Never waits.
    pub fn try_claim(&self, fingerprint: &Fingerprint, clone_id: CloneId, ttl: Duration) -> ClaimOutcome {
        let mut locks = self.locks.lock();
        let now = self.clock.now();

        if let Some(existing) = locks.get(fingerprint) {
            if existing.is_live(now) && existing.holder != clone_id {
                let holder = existing.holder;
                drop(locks);
                debug!(%fingerprint, %clone_id, %holder, "Claim denied: already held");
                metrics::counter!("swarm_claims_total", "outcome" => "denied").increment(1);
                return ClaimOutcome::Denied(ClaimDenial::AlreadyHeld { holder });
            }
        }

        let refreshed = locks
            .get(fingerprint)
            .is_some_and(|l| l.is_held_by(clone_id, now));
        let lock = ClaimLock {
            fingerprint: fingerprint.clone(),
            holder: clone_id,
            acquired_at: now,
            ttl,
        };
        let expires_at = lock.expires_at();
        locks.insert(fingerprint.clone(), lock);
        drop(locks);

        debug!(%fingerprint, %clone_id, refreshed, %expires_at, "Claim granted");
        let outcome = if refreshed { "refreshed" } else { "granted" };
        metrics::counter!("swarm_claims_total", "outcome" => outcome).increment(1);
        ClaimOutcome::Granted { expires_at, refreshed }
    }

    /// Remove the lock only if `clone_id` holds it. Returns whether a lock was
    /// removed; a stale or foreign release is a no-op.
    pub fn release(&self, fingerprint: &Fingerprint, clone_id: CloneId) -> bool {
        let mut locks = self.locks.lock();
        match locks.get(fingerprint) {
            Some(lock) if lock.holder == clone_id => {
                locks.remove(fingerprint);
                debug!(%fingerprint, %clone_id, "Claim released");
                true
            }
            Some(lock) => {
                trace!(%fingerprint, %clone_id, holder = %lock.holder, "Ignoring release from non-holder");
                false
            }
            None => false,
        }
    }

    /// Live lock on `fingerprint`, if any.
    pub fn live_lock(&self, fingerprint: &Fingerprint) -> Option<ClaimLock> {
        let locks = self.locks.lock();
        let now = self.clock.now();
        locks.get(fingerprint).filter(|l| l.is_live(now)).cloned()
    }

    pub fn holder_of(&self, fingerprint: &Fingerprint) -> Option<CloneId> {
        self.live_lock(fingerprint).map(|l| l.holder)
    }

    pub fn is_held_by(&self, fingerprint: &Fingerprint, clone_id: CloneId) -> bool {
        let locks = self.locks.lock();
        let now = self.clock.now();
        locks
            .get(fingerprint)
            .is_some_and(|l| l.is_held_by(clone_id, now))
    }

    /// Drop every expired entry. Purely housekeeping; expiry semantics do not
    /// depend on it.
    pub fn purge_expired(&self) -> usize {
        let mut locks = self.locks.lock();
        let now = self.clock.now();
        let before = locks.len();
        locks.retain(|_, l| l.is_live(now));
        before - locks.len()
    }

    pub fn live_count(&self) -> usize {
        let locks = self.locks.lock();
        let now = self.clock.now();
        locks.values().filter(|l| l.is_live(now)).count()
    }

    /// Every entry in the table, expired ones included.
    pub fn entries(&self) -> Vec<ClaimLock> {
        let mut entries: Vec<ClaimLock> = self.locks.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }

    pub fn restore(&self, entries: Vec<ClaimLock>) {
        let mut locks = self.locks.lock();
        locks.clear();
        for lock in entries {
            locks.insert(lock.fingerprint.clone(), lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;

    fn registry() -> (Arc<ManualClock>, ClaimRegistry) {
        let clock = Arc::new(ManualClock::default());
        let registry = ClaimRegistry::new(clock.clone());
        (clock, registry)
    }

    #[test]
    fn test_second_claimant_is_denied_with_holder() {
        let (_, registry) = registry();
        let h1 = Fingerprint::from("H1");
        let ttl = Duration::from_secs(5);

        assert!(registry.try_claim(&h1, CloneId(1), ttl).is_granted());
        let denied = registry.try_claim(&h1, CloneId(2), ttl);
        assert_eq!(denied, ClaimOutcome::Denied(ClaimDenial::AlreadyHeld { holder: CloneId(1) }));
    }

    #[test]
    fn test_holder_reclaim_refreshes_ttl() {
        let (clock, registry) = registry();
        let h1 = Fingerprint::from("H1");
        let ttl = Duration::from_secs(5);

        registry.try_claim(&h1, CloneId(1), ttl);
        clock.advance(Duration::from_secs(4));
        match registry.try_claim(&h1, CloneId(1), ttl) {
            ClaimOutcome::Granted { refreshed, expires_at } => {
                assert!(refreshed);
                assert_eq!(expires_at, clock.now() + chrono::TimeDelta::seconds(5));
            }
            other => panic!("expected refresh, got {:?}", other),
        }
        clock.advance(Duration::from_secs(4));
        assert!(!registry.try_claim(&h1, CloneId(2), ttl).is_granted());
    }

    #[test]
    fn test_expired_lock_is_claimable() {
        let (clock, registry) = registry();
        let h1 = Fingerprint::from("H1");
        let ttl = Duration::from_secs(5);

        registry.try_claim(&h1, CloneId(1), ttl);
        clock.advance(ttl);
        match registry.try_claim(&h1, CloneId(2), ttl) {
            ClaimOutcome::Granted { refreshed, .. } => assert!(!refreshed),
            other => panic!("expected grant, got {:?}", other),
        }
        assert_eq!(registry.holder_of(&h1), Some(CloneId(2)));
    }

    #[test]
    fn test_release_by_non_holder_is_noop() {
        let (_, registry) = registry();
        let h1 = Fingerprint::from("H1");

        registry.try_claim(&h1, CloneId(1), Duration::from_secs(5));
        assert!(!registry.release(&h1, CloneId(2)));
        assert_eq!(registry.holder_of(&h1), Some(CloneId(1)));
        assert!(registry.release(&h1, CloneId(1)));
        assert_eq!(registry.holder_of(&h1), None);
        assert!(!registry.release(&h1, CloneId(1)));
    }

    #[test]
    fn test_stale_holder_cannot_release_new_holders_lock() {
        let (clock, registry) = registry();
        let h1 = Fingerprint::from("H1");
        let ttl = Duration::from_secs(5);

        registry.try_claim(&h1, CloneId(1), ttl);
        clock.advance(Duration::from_secs(6));
        registry.try_claim(&h1, CloneId(2), ttl);
        assert!(!registry.release(&h1, CloneId(1)));
        assert_eq!(registry.holder_of(&h1), Some(CloneId(2)));
    }

    #[test]
    fn test_purge_and_restore() {
        let (clock, registry) = registry();
        registry.try_claim(&"A".into(), CloneId(1), Duration::from_secs(1));
        registry.try_claim(&"B".into(), CloneId(2), Duration::from_secs(10));
        clock.advance(Duration::from_secs(2));

        assert_eq!(registry.live_count(), 1);
        let entries = registry.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(registry.purge_expired(), 1);

        registry.restore(entries);
        assert_eq!(registry.entries().len(), 2);
        assert_eq!(registry.live_count(), 1);
    }
}
