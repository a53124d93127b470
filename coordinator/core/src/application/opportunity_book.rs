// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ephemeral store of discovered opportunities, keyed by fingerprint.
//!
//! Opportunities are discarded once their deadline passes or their claim is
//! settled. The ledger reads `discovered_by` from here when a reservation is
//! opened.

use crate::domain::clock::Clock;
use crate::domain::opportunity::{Fingerprint, Opportunity};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct OpportunityBook {
    entries: DashMap<Fingerprint, Opportunity>,
    clock: Arc<dyn Clock>,
}

impl OpportunityBook {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Record an opportunity. The first report of a fingerprint wins so that
    /// the original discoverer keeps the bonus; returns `false` for repeats
    /// and for opportunities already past their deadline.
    pub fn submit(&self, opportunity: Opportunity) -> bool {
        let now = self.clock.now();
        if opportunity.is_expired(now) {
            debug!(fingerprint = %opportunity.fingerprint, "Dropping expired opportunity");
            return false;
        }
        match self.entries.entry(opportunity.fingerprint.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(opportunity);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(opportunity);
                true
            }
        }
    }

    /// Unexpired opportunity for `fingerprint`.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Opportunity> {
        let now = self.clock.now();
        self.entries
            .get(fingerprint)
            .filter(|o| !o.is_expired(now))
            .map(|o| o.value().clone())
    }

    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<Opportunity> {
        self.entries.remove(fingerprint).map(|(_, o)| o)
    }

    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, o| !o.is_expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
