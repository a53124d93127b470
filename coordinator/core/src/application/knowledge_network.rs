// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Knowledge Propagation Network
//!
//! Gossip dissemination of [`KnowledgeFragment`]s with controlled fidelity
//! loss. Each holder forwards to up to `fanout` reachable clones that have
//! not seen the fragment yet; every recipient gets its own derived fragment
//! one hop further away. A branch stops once the derived distance would
//! exceed `max_distance` or accuracy decays to zero.
//!
//! Each clone keeps one fragment per `fact_key`. Conflicts resolve by
//! [`KnowledgeFragment::supersedes`].

use crate::domain::clone::CloneId;
use crate::domain::knowledge::{DecayModel, KnowledgeFragment};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub clone_id: CloneId,
    pub accuracy: f64,
    pub distance: u32,
    /// The recipient kept this fragment over what it already knew.
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    pub fact_key: String,
    pub origin_clone_id: CloneId,
    pub deliveries: Vec<Delivery>,
    pub max_distance_reached: u32,
}

pub struct KnowledgeNetwork {
    model: DecayModel,
    fanout: usize,
    inboxes: DashMap<CloneId, HashMap<String, KnowledgeFragment>>,
    rng: Mutex<StdRng>,
}

impl KnowledgeNetwork {
    pub fn new(model: DecayModel, fanout: usize) -> Self {
        Self::with_rng(model, fanout, StdRng::from_os_rng())
    }

    pub fn with_seed(model: DecayModel, fanout: usize, seed: u64) -> Self {
        Self::with_rng(model, fanout, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(model: DecayModel, fanout: usize, rng: StdRng) -> Self {
        Self {
            model,
            fanout: fanout.max(1),
            inboxes: DashMap::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Spread `fragment` from its holder through `reachable` clones.
    ///
    /// The holder is `fragment.origin_clone_id` when the fragment is fresh
    /// (distance 0); it records the fragment in its own inbox first.
    pub fn propagate(
        &self,
        fragment: KnowledgeFragment,
        max_distance: u32,
        reachable: &[CloneId],
    ) -> PropagationReport {
        let origin = fragment.origin_clone_id;
        let mut report = PropagationReport {
            fact_key: fragment.fact_key.clone(),
            origin_clone_id: origin,
            deliveries: Vec::new(),
            max_distance_reached: fragment.propagation_distance,
        };
        self.receive(origin, fragment.clone());

        let mut visited: HashSet<CloneId> = HashSet::from([origin]);
        let mut frontier = vec![(origin, fragment)];
        let mut rng = self.rng.lock();

        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for (holder, held) in frontier {
                if held.propagation_distance >= max_distance {
                    continue;
                }
                let mut peers: Vec<CloneId> = reachable
                    .iter()
                    .copied()
                    .filter(|id| !visited.contains(id))
                    .collect();
                if peers.is_empty() {
                    break;
                }
                peers.shuffle(&mut *rng);
                peers.truncate(self.fanout);

                for peer in peers {
                    let Some(derived) = held.derive_hop(&self.model, &mut *rng) else {
                        trace!(%holder, fact_key = %held.fact_key, "Fragment decayed to zero");
                        continue;
                    };
                    visited.insert(peer);
                    let accepted = self.receive(peer, derived.clone());
                    report.max_distance_reached = report.max_distance_reached.max(derived.propagation_distance);
                    report.deliveries.push(Delivery {
                        clone_id: peer,
                        accuracy: derived.accuracy,
                        distance: derived.propagation_distance,
                        accepted,
                    });
                    next_frontier.push((peer, derived));
                }
            }
            frontier = next_frontier;
        }
        drop(rng);

        debug!(
            fact_key = %report.fact_key,
            %origin,
            deliveries = report.deliveries.len(),
            max_distance_reached = report.max_distance_reached,
            "Fragment propagated"
        );
        metrics::counter!("swarm_fragments_delivered_total").increment(report.deliveries.len() as u64);
        report
    }

    /// Store `fragment` in the recipient's inbox unless it already holds a
    /// fragment for the same fact that supersedes it.
    pub fn receive(&self, clone_id: CloneId, fragment: KnowledgeFragment) -> bool {
        let mut inbox = self.inboxes.entry(clone_id).or_default();
        let keep_existing = inbox
            .get(&fragment.fact_key)
            .is_some_and(|existing| !fragment.supersedes(existing));
        if keep_existing {
            return false;
        }
        inbox.insert(fragment.fact_key.clone(), fragment);
        true
    }

    pub fn knowledge_of(&self, clone_id: CloneId, fact_key: &str) -> Option<KnowledgeFragment> {
        self.inboxes
            .get(&clone_id)
            .and_then(|inbox| inbox.get(fact_key).cloned())
    }

    pub fn facts_known_by(&self, clone_id: CloneId) -> usize {
        self.inboxes.get(&clone_id).map(|i| i.len()).unwrap_or(0)
    }

    /// Drop everything a retired clone knew.
    pub fn forget(&self, clone_id: CloneId) {
        self.inboxes.remove(&clone_id);
    }
}
