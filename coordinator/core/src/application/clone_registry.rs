// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Clone Registry (Behavioral Genome Store)
//!
//! Holds every clone with its genome and lineage, keyed by id. Parent and
//! sibling relations are id lookups into this table; nothing holds a live
//! reference to another clone.
//!
//! Spawning delegates to the pure [`genome::spawn`](crate::domain::genome::spawn)
//! with the registry's injected random source. Once attached, a genome only
//! changes through [`CloneRegistry::record_mutation`] or a resurrection.

use crate::domain::clock::Clock;
use crate::domain::clone::{CloneError, CloneId, CloneStatus, TradingClone};
use crate::domain::error::CoordinatorError;
use crate::domain::genome::{self, Gene, GeneValue, Genome, GenomeError, MutationPolicy};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CloneRegistry {
    clones: RwLock<HashMap<CloneId, TradingClone>>,
    next_id: AtomicU64,
    policy: MutationPolicy,
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
}

impl CloneRegistry {
    pub fn new(policy: MutationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(policy, clock, StdRng::from_os_rng())
    }

    pub fn with_seed(policy: MutationPolicy, clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(policy, clock, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(policy: MutationPolicy, clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            clones: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            policy,
            rng: Mutex::new(rng),
            clock,
        }
    }

    pub fn policy(&self) -> &MutationPolicy {
        &self.policy
    }

    fn allocate_id(&self) -> CloneId {
        CloneId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a generation-0 clone. Draws a random genome when none is given.
    pub fn register_root(&self, genome: Option<Genome>) -> TradingClone {
        let genome = genome.unwrap_or_else(|| Genome::random(&self.policy, &mut *self.rng.lock()));
        let clone = TradingClone::new(self.allocate_id(), None, 0, genome, self.clock.now());
        info!(clone_id = %clone.id, specialization = %clone.genome.specialization, "Root clone registered");
        self.clones.write().insert(clone.id, clone.clone());
        clone
    }

    /// Derive a child genome with the registry's random source.
    pub fn spawn_genome(&self, parent_genome: &Genome, generation: u32) -> Genome {
        let mut rng = self.rng.lock();
        genome::spawn(parent_genome, generation, &self.policy, &mut *rng, self.clock.now())
    }

    /// Spawn and register a child of `parent_id`.
    pub fn spawn_child(&self, parent_id: CloneId) -> Result<TradingClone, CloneError> {
        let parent = self.get(parent_id).ok_or(CloneError::NotFound(parent_id))?;
        if parent.status.is_terminal() {
            return Err(CloneError::Retired(parent_id));
        }
        let generation = parent.generation + 1;
        let child_genome = self.spawn_genome(&parent.genome, generation);
        let mutations = child_genome.mutation_lineage.len() - parent.genome.mutation_lineage.len();
        let child = TradingClone::new(self.allocate_id(), Some(parent_id), generation, child_genome, self.clock.now());

        info!(
            clone_id = %child.id,
            parent_id = %parent_id,
            generation,
            mutations,
            "Clone spawned"
        );
        self.clones.write().insert(child.id, child.clone());
        Ok(child)
    }

    pub fn get(&self, id: CloneId) -> Option<TradingClone> {
        self.clones.read().get(&id).cloned()
    }

    pub fn status_of(&self, id: CloneId) -> Option<CloneStatus> {
        self.clones.read().get(&id).map(|c| c.status)
    }

    pub fn all(&self) -> Vec<TradingClone> {
        let mut all: Vec<TradingClone> = self.clones.read().values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }

    /// Clones sharing `id`'s immediate parent, excluding `id` itself.
    pub fn siblings_of(&self, id: CloneId) -> Vec<TradingClone> {
        let clones = self.clones.read();
        let Some(target) = clones.get(&id) else {
            return Vec::new();
        };
        let mut siblings: Vec<TradingClone> = clones
            .values()
            .filter(|c| c.is_sibling_of(target))
            .cloned()
            .collect();
        siblings.sort_by_key(|c| c.id);
        siblings
    }

    pub fn live_ids(&self) -> Vec<CloneId> {
        let mut ids: Vec<CloneId> = self
            .clones
            .read()
            .values()
            .filter(|c| c.status.is_live())
            .map(|c| c.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn count_by_status(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for clone in self.clones.read().values() {
            *counts.entry(format!("{:?}", clone.status).to_lowercase()).or_insert(0) += 1;
        }
        counts
    }

    /// Apply `f` to a clone under the write lock.
    pub fn update<T>(
        &self,
        id: CloneId,
        f: impl FnOnce(&mut TradingClone) -> Result<T, CloneError>,
    ) -> Result<T, CloneError> {
        let mut clones = self.clones.write();
        let clone = clones.get_mut(&id).ok_or(CloneError::NotFound(id))?;
        f(clone)
    }

    /// A heartbeat arrived. Returns the previous status when it changed.
    pub fn on_heartbeat(&self, id: CloneId) -> Result<Option<CloneStatus>, CloneError> {
        self.update(id, |clone| match clone.status {
            CloneStatus::Active => Ok(None),
            CloneStatus::Spawning | CloneStatus::Degraded => {
                let previous = clone.status;
                clone.mark_active()?;
                Ok(Some(previous))
            }
            CloneStatus::Suspected => Ok(None),
            CloneStatus::Retired => Err(CloneError::Retired(id)),
        })
    }

    /// Apply an in-life mutation, validating categorical values against the
    /// allowed sets.
    pub fn record_mutation(&self, id: CloneId, gene: Gene, value: GeneValue) -> Result<(), CoordinatorError> {
        let allowed = match (&value, gene) {
            (GeneValue::Categorical(v), Gene::PreferredVenue { .. }) => self.policy.venues.contains(v),
            (GeneValue::Categorical(v), Gene::Specialization) => self.policy.specializations.contains(v),
            (GeneValue::Numeric(v), _) => v.is_finite(),
            _ => true,
        };
        if !allowed {
            return Err(GenomeError::NotAllowed {
                gene,
                value: value.to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        let mut clones = self.clones.write();
        let clone = clones.get_mut(&id).ok_or(CloneError::NotFound(id))?;
        if clone.status.is_terminal() {
            return Err(CloneError::Retired(id).into());
        }
        let generation = clone.generation;
        clone.genome.apply_mutation(gene, value, generation, now)?;
        debug!(clone_id = %id, %gene, "Mutation recorded");
        Ok(())
    }

    pub fn set_capital_allocation(&self, id: CloneId, amount: f64) {
        if let Some(clone) = self.clones.write().get_mut(&id) {
            clone.capital_allocation = amount;
        }
    }

    pub fn restore(&self, clones: Vec<TradingClone>) {
        let next = clones.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        let mut table = self.clones.write();
        table.clear();
        for clone in clones {
            table.insert(clone.id, clone);
        }
        self.next_id.store(next, Ordering::SeqCst);
    }
}
