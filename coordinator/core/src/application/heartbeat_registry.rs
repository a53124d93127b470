// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Heartbeat Registry
//!
//! Last-write-wins liveness table keyed by clone id and ordered by the
//! snapshot's `taken_at`. Updates for different clones never contend; a
//! heartbeat older than (or as old as) the recorded one is discarded, never
//! reordered.

use crate::domain::clock::Clock;
use crate::domain::clone::CloneId;
use crate::domain::heartbeat::{HeartbeatOutcome, HeartbeatRecord, PartialStateSnapshot, SiblingCopy};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct HeartbeatRegistry {
    records: DashMap<CloneId, HeartbeatRecord>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    pub fn record(&self, clone_id: CloneId, snapshot: PartialStateSnapshot) -> HeartbeatOutcome {
        let now = self.clock.now();
        match self.records.entry(clone_id) {
            Entry::Occupied(mut existing) => {
                if snapshot.taken_at <= existing.get().snapshot.taken_at {
                    debug!(%clone_id, taken_at = %snapshot.taken_at, "Discarding stale heartbeat");
                    return HeartbeatOutcome::Stale;
                }
                existing.insert(HeartbeatRecord {
                    clone_id,
                    last_seen: now,
                    snapshot,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(HeartbeatRecord {
                    clone_id,
                    last_seen: now,
                    snapshot,
                });
            }
        }
        HeartbeatOutcome::Recorded
    }

    pub fn get(&self, clone_id: CloneId) -> Option<HeartbeatRecord> {
        self.records.get(&clone_id).map(|r| r.value().clone())
    }

    /// Clones with a recorded heartbeat.
    pub fn known(&self) -> Vec<CloneId> {
        let mut ids: Vec<CloneId> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort();
        ids
    }

    /// Copy of `target`'s state held by `holder`, if `holder` reported one.
    pub fn sibling_copy(&self, holder: CloneId, target: CloneId) -> Option<SiblingCopy> {
        self.records
            .get(&holder)
            .and_then(|r| r.snapshot.sibling_copies.get(&target).cloned())
    }

    /// Restart the liveness clock of a resurrected clone without touching its
    /// last reported snapshot. A clone that never reported gets an empty
    /// snapshot that any real heartbeat supersedes.
    pub fn reset_liveness(&self, clone_id: CloneId) {
        let now = self.clock.now();
        self.records
            .entry(clone_id)
            .and_modify(|record| record.last_seen = now)
            .or_insert_with(|| HeartbeatRecord {
                clone_id,
                last_seen: now,
                snapshot: PartialStateSnapshot::at(DateTime::<Utc>::MIN_UTC),
            });
    }

    pub fn remove(&self, clone_id: CloneId) -> Option<HeartbeatRecord> {
        self.records.remove(&clone_id).map(|(_, r)| r)
    }

    pub fn entries(&self) -> Vec<HeartbeatRecord> {
        let mut all: Vec<HeartbeatRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.clone_id);
        all
    }

    pub fn restore(&self, entries: Vec<HeartbeatRecord>) {
        self.records.clear();
        for record in entries {
            self.records.insert(record.clone_id, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use chrono::TimeDelta;
    use std::time::Duration;

    #[test]
    fn test_last_write_wins_by_snapshot_time() {
        let clock = Arc::new(ManualClock::default());
        let registry = HeartbeatRegistry::new(clock.clone());
        let t0 = clock.now();

        let mut newer = PartialStateSnapshot::at(t0 + TimeDelta::seconds(2));
        newer.open_positions = 2;
        assert_eq!(registry.record(CloneId(1), newer), HeartbeatOutcome::Recorded);
        assert_eq!(
            registry.record(CloneId(1), PartialStateSnapshot::at(t0)),
            HeartbeatOutcome::Stale
        );
        assert_eq!(
            registry.record(CloneId(1), PartialStateSnapshot::at(t0 + TimeDelta::seconds(2))),
            HeartbeatOutcome::Stale
        );
        assert_eq!(registry.get(CloneId(1)).unwrap().snapshot.open_positions, 2);
    }

    #[test]
    fn test_reset_liveness_keeps_snapshot() {
        let clock = Arc::new(ManualClock::default());
        let registry = HeartbeatRegistry::new(clock.clone());
        let snapshot = PartialStateSnapshot::at(clock.now());
        registry.record(CloneId(3), snapshot.clone());

        clock.advance(Duration::from_secs(120));
        registry.reset_liveness(CloneId(3));
        let record = registry.get(CloneId(3)).unwrap();
        assert_eq!(record.last_seen, clock.now());
        assert_eq!(record.snapshot, snapshot);
    }

    #[test]
    fn test_sibling_copy_lookup() {
        let clock = Arc::new(ManualClock::default());
        let registry = HeartbeatRegistry::new(clock.clone());
        let copy = SiblingCopy {
            coverage: 0.4,
            genome: None,
            captured_at: clock.now(),
        };
        registry.record(
            CloneId(6),
            PartialStateSnapshot::at(clock.now()).with_sibling_copy(CloneId(5), copy.clone()),
        );
        assert_eq!(registry.sibling_copy(CloneId(6), CloneId(5)), Some(copy));
        assert_eq!(registry.sibling_copy(CloneId(6), CloneId(7)), None);
        assert_eq!(registry.known(), vec![CloneId(6)]);
    }
}
