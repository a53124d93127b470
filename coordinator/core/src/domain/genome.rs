// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Behavioral Genome
//!
//! The mutated strategy/behavior parameters a clone inherits and evolves.
//!
//! Spawning is a pure function of `(parent genome, generation, policy, rng)`:
//! numeric genes receive uniform multiplicative jitter, categorical genes are
//! redrawn from the allowed set with a fixed probability, and every change is
//! appended to the inherited `mutation_lineage`. The lineage is an append-only
//! audit log; nothing in this module ever rewrites an existing entry.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifies a single mutable gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "gene")]
pub enum Gene {
    ResponseDelayMin,
    ResponseDelayMax,
    ScheduleOffset,
    SizeVariance,
    SlippageTolerance,
    PriorityFeeMultiplier,
    PreferredVenue { slot: usize },
    Specialization,
}

impl Gene {
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::PreferredVenue { .. } | Self::Specialization)
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResponseDelayMin => write!(f, "response_delay_range.min_ms"),
            Self::ResponseDelayMax => write!(f, "response_delay_range.max_ms"),
            Self::ScheduleOffset => write!(f, "schedule_offset_ms"),
            Self::SizeVariance => write!(f, "size_variance"),
            Self::SlippageTolerance => write!(f, "slippage_tolerance"),
            Self::PriorityFeeMultiplier => write!(f, "priority_fee_multiplier"),
            Self::PreferredVenue { slot } => write!(f, "preferred_venues[{}]", slot),
            Self::Specialization => write!(f, "specialization"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneValue {
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for GeneValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{:.6}", v),
            Self::Categorical(v) => write!(f, "{}", v),
        }
    }
}

/// One entry of the append-only mutation audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub timestamp: DateTime<Utc>,
    /// Generation of the genome that received the change.
    pub generation: u32,
    pub parameter: Gene,
    pub old: GeneValue,
    pub new: GeneValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DelayRange {
    pub fn contains(&self, ms: f64) -> bool {
        ms >= self.min_ms && ms <= self.max_ms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub response_delay_range: DelayRange,
    /// Ordered set: no venue appears twice.
    pub preferred_venues: Vec<String>,
    pub schedule_offset_ms: f64,
    pub specialization: String,
    pub size_variance: f64,
    pub slippage_tolerance: f64,
    pub priority_fee_multiplier: f64,
    pub mutation_lineage: Vec<MutationEvent>,
}

/// Mutation knobs, usually built from `GenomeConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationPolicy {
    /// Uniform jitter half-width applied multiplicatively to numeric genes.
    pub numeric_jitter: f64,
    /// Probability that a categorical gene is redrawn at spawn.
    pub categorical_redraw_probability: f64,
    pub venues: Vec<String>,
    pub specializations: Vec<String>,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            numeric_jitter: 0.20,
            categorical_redraw_probability: 0.10,
            venues: default_venues(),
            specializations: default_specializations(),
        }
    }
}

pub fn default_venues() -> Vec<String> {
    ["jupiter", "raydium", "orca", "meteora", "phoenix"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

pub fn default_specializations() -> Vec<String> {
    [
        "jupiter_arbitrage",
        "raydium_liquidity",
        "pump_fun_sniper",
        "jito_mev_hunter",
        "lending_optimizer",
        "drift_perps",
        "zeta_options",
        "social_momentum",
    ]
    .iter()
    .map(|v| v.to_string())
    .collect()
}

#[derive(Debug, Error, PartialEq)]
pub enum GenomeError {
    #[error("gene {gene} expects a {expected} value")]
    TypeMismatch { gene: Gene, expected: &'static str },

    #[error("preferred venue slot {slot} is out of range ({len} venues)")]
    SlotOutOfRange { slot: usize, len: usize },

    #[error("venue '{0}' is already preferred")]
    DuplicateVenue(String),

    #[error("value {value} is not allowed for gene {gene}")]
    NotAllowed { gene: Gene, value: String },

    #[error("response delay range would become [{min_ms}, {max_ms}]")]
    InvertedDelayRange { min_ms: f64, max_ms: f64 },
}

impl Genome {
    /// Draw a fresh root genome (generation 0) from the policy's allowed sets.
    pub fn random<R: Rng>(policy: &MutationPolicy, rng: &mut R) -> Self {
        let min_ms = rng.random_range(100.0..1000.0);
        let max_ms = rng.random_range(min_ms..2000.0);

        let mut venues = policy.venues.clone();
        let mut preferred_venues = Vec::new();
        while preferred_venues.len() < 2 && !venues.is_empty() {
            let idx = rng.random_range(0..venues.len());
            preferred_venues.push(venues.swap_remove(idx));
        }

        let specialization = if policy.specializations.is_empty() {
            "general".to_string()
        } else {
            policy.specializations[rng.random_range(0..policy.specializations.len())].clone()
        };

        Self {
            response_delay_range: DelayRange { min_ms, max_ms },
            preferred_venues,
            schedule_offset_ms: rng.random_range(0.0..250.0),
            specialization,
            size_variance: rng.random_range(0.8..1.2),
            slippage_tolerance: rng.random_range(0.001..0.005),
            priority_fee_multiplier: rng.random_range(1.1..1.5),
            mutation_lineage: Vec::new(),
        }
    }

    pub fn value_of(&self, gene: Gene) -> Option<GeneValue> {
        let value = match gene {
            Gene::ResponseDelayMin => GeneValue::Numeric(self.response_delay_range.min_ms),
            Gene::ResponseDelayMax => GeneValue::Numeric(self.response_delay_range.max_ms),
            Gene::ScheduleOffset => GeneValue::Numeric(self.schedule_offset_ms),
            Gene::SizeVariance => GeneValue::Numeric(self.size_variance),
            Gene::SlippageTolerance => GeneValue::Numeric(self.slippage_tolerance),
            Gene::PriorityFeeMultiplier => GeneValue::Numeric(self.priority_fee_multiplier),
            Gene::PreferredVenue { slot } => {
                GeneValue::Categorical(self.preferred_venues.get(slot)?.clone())
            }
            Gene::Specialization => GeneValue::Categorical(self.specialization.clone()),
        };
        Some(value)
    }

    /// Apply an in-life mutation and record it in the lineage.
    ///
    /// No-op (and no lineage entry) when the value is unchanged.
    pub fn apply_mutation(
        &mut self,
        gene: Gene,
        value: GeneValue,
        generation: u32,
        at: DateTime<Utc>,
    ) -> Result<(), GenomeError> {
        let old = self.set(gene, value.clone())?;
        if old != value {
            self.mutation_lineage.push(MutationEvent {
                timestamp: at,
                generation,
                parameter: gene,
                old,
                new: value,
            });
        }
        Ok(())
    }

    /// Replay the lineage entries a sibling's copy recorded past this
    /// genome's own lineage.
    ///
    /// The copy is only used when its lineage extends this one; a stale or
    /// diverged copy changes nothing. Either every entry applies or none
    /// does. Returns the number of entries appended.
    pub fn catch_up(&mut self, copy: &Genome) -> Result<usize, GenomeError> {
        let known = self.mutation_lineage.len();
        if copy.mutation_lineage.len() <= known || !copy.mutation_lineage.starts_with(&self.mutation_lineage) {
            return Ok(0);
        }
        let mut next = self.clone();
        for event in &copy.mutation_lineage[known..] {
            next.apply_mutation(event.parameter, event.new.clone(), event.generation, event.timestamp)?;
        }
        let appended = next.mutation_lineage.len() - known;
        *self = next;
        Ok(appended)
    }

    fn set(&mut self, gene: Gene, value: GeneValue) -> Result<GeneValue, GenomeError> {
        match (gene, value) {
            (Gene::PreferredVenue { slot }, GeneValue::Categorical(venue)) => {
                let len = self.preferred_venues.len();
                if slot >= len {
                    return Err(GenomeError::SlotOutOfRange { slot, len });
                }
                if self.preferred_venues[slot] != venue && self.preferred_venues.contains(&venue) {
                    return Err(GenomeError::DuplicateVenue(venue));
                }
                let old = std::mem::replace(&mut self.preferred_venues[slot], venue);
                Ok(GeneValue::Categorical(old))
            }
            (Gene::Specialization, GeneValue::Categorical(spec)) => {
                let old = std::mem::replace(&mut self.specialization, spec);
                Ok(GeneValue::Categorical(old))
            }
            (gene, GeneValue::Numeric(v)) if !gene.is_categorical() => {
                let range = self.response_delay_range;
                let inverted = match gene {
                    Gene::ResponseDelayMin => v > range.max_ms,
                    Gene::ResponseDelayMax => v < range.min_ms,
                    _ => false,
                };
                if inverted {
                    let (min_ms, max_ms) = match gene {
                        Gene::ResponseDelayMin => (v, range.max_ms),
                        _ => (range.min_ms, v),
                    };
                    return Err(GenomeError::InvertedDelayRange { min_ms, max_ms });
                }
                let slot = match gene {
                    Gene::ResponseDelayMin => &mut self.response_delay_range.min_ms,
                    Gene::ResponseDelayMax => &mut self.response_delay_range.max_ms,
                    Gene::ScheduleOffset => &mut self.schedule_offset_ms,
                    Gene::SizeVariance => &mut self.size_variance,
                    Gene::SlippageTolerance => &mut self.slippage_tolerance,
                    _ => &mut self.priority_fee_multiplier,
                };
                let old = std::mem::replace(slot, v);
                Ok(GeneValue::Numeric(old))
            }
            (gene, _) => Err(GenomeError::TypeMismatch {
                gene,
                expected: if gene.is_categorical() { "categorical" } else { "numeric" },
            }),
        }
    }
}

/// Derive a child genome from its parent.
///
/// Copies every parent parameter, jitters each numeric gene by a uniform
/// factor in `[-numeric_jitter, +numeric_jitter]`, redraws each categorical
/// gene with probability `categorical_redraw_probability`, and appends one
/// lineage entry per changed gene on top of the inherited lineage.
pub fn spawn<R: Rng>(
    parent: &Genome,
    generation: u32,
    policy: &MutationPolicy,
    rng: &mut R,
    at: DateTime<Utc>,
) -> Genome {
    let mut child = parent.clone();
    let record = |child: &mut Genome, gene: Gene, old: GeneValue, new: GeneValue| {
        if old != new {
            child.mutation_lineage.push(MutationEvent {
                timestamp: at,
                generation,
                parameter: gene,
                old,
                new,
            });
        }
    };

    let jitter = policy.numeric_jitter.abs();
    let jittered = |rng: &mut R, v: f64| {
        if jitter == 0.0 {
            v
        } else {
            v * (1.0 + rng.random_range(-jitter..=jitter))
        }
    };

    let old_range = parent.response_delay_range;
    let min_ms = jittered(rng, old_range.min_ms);
    let max_ms = jittered(rng, old_range.max_ms).max(min_ms);
    child.response_delay_range = DelayRange { min_ms, max_ms };
    record(&mut child, Gene::ResponseDelayMin, GeneValue::Numeric(old_range.min_ms), GeneValue::Numeric(min_ms));
    record(&mut child, Gene::ResponseDelayMax, GeneValue::Numeric(old_range.max_ms), GeneValue::Numeric(max_ms));

    for gene in [
        Gene::ScheduleOffset,
        Gene::SizeVariance,
        Gene::SlippageTolerance,
        Gene::PriorityFeeMultiplier,
    ] {
        if let Some(GeneValue::Numeric(old)) = parent.value_of(gene) {
            let new = jittered(rng, old);
            // set() cannot fail for numeric genes with numeric values
            let _ = child.set(gene, GeneValue::Numeric(new));
            record(&mut child, gene, GeneValue::Numeric(old), GeneValue::Numeric(new));
        }
    }

    let redraw = policy.categorical_redraw_probability.clamp(0.0, 1.0);

    for slot in 0..child.preferred_venues.len() {
        if !rng.random_bool(redraw) {
            continue;
        }
        let candidates: Vec<&String> = policy
            .venues
            .iter()
            .filter(|v| !child.preferred_venues.contains(v))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        let venue = candidates[rng.random_range(0..candidates.len())].clone();
        let old = std::mem::replace(&mut child.preferred_venues[slot], venue.clone());
        record(
            &mut child,
            Gene::PreferredVenue { slot },
            GeneValue::Categorical(old),
            GeneValue::Categorical(venue),
        );
    }

    if rng.random_bool(redraw) {
        let candidates: Vec<&String> = policy
            .specializations
            .iter()
            .filter(|s| **s != child.specialization)
            .collect();
        if !candidates.is_empty() {
            let spec = candidates[rng.random_range(0..candidates.len())].clone();
            let old = std::mem::replace(&mut child.specialization, spec.clone());
            record(
                &mut child,
                Gene::Specialization,
                GeneValue::Categorical(old),
                GeneValue::Categorical(spec),
            );
        }
    }

    child
}

/// Reproducible variant of [`spawn`] driven by a seed.
pub fn spawn_seeded(
    parent: &Genome,
    generation: u32,
    policy: &MutationPolicy,
    seed: u64,
    at: DateTime<Utc>,
) -> Genome {
    let mut rng = StdRng::seed_from_u64(seed);
    spawn(parent, generation, policy, &mut rng, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Genome {
        Genome {
            response_delay_range: DelayRange { min_ms: 200.0, max_ms: 800.0 },
            preferred_venues: vec!["jupiter".to_string(), "orca".to_string()],
            schedule_offset_ms: 50.0,
            specialization: "jito_mev_hunter".to_string(),
            size_variance: 1.0,
            slippage_tolerance: 0.003,
            priority_fee_multiplier: 1.2,
            mutation_lineage: Vec::new(),
        }
    }

    #[test]
    fn test_numeric_jitter_stays_within_twenty_percent() {
        let policy = MutationPolicy::default();
        let parent = parent();
        for seed in 0..200 {
            let child = spawn_seeded(&parent, 1, &policy, seed, Utc::now());
            assert!(child.schedule_offset_ms >= 40.0 - 1e-9 && child.schedule_offset_ms <= 60.0 + 1e-9);
            assert!(child.size_variance >= 0.8 - 1e-9 && child.size_variance <= 1.2 + 1e-9);
            assert!(child.response_delay_range.min_ms <= child.response_delay_range.max_ms);
        }
    }

    #[test]
    fn test_spawn_is_reproducible_for_a_seed() {
        let policy = MutationPolicy::default();
        let at = Utc::now();
        let a = spawn_seeded(&parent(), 1, &policy, 42, at);
        let b = spawn_seeded(&parent(), 1, &policy, 42, at);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lineage_is_appended_not_overwritten() {
        let policy = MutationPolicy::default();
        let at = Utc::now();
        let child = spawn_seeded(&parent(), 1, &policy, 7, at);
        let grandchild = spawn_seeded(&child, 2, &policy, 8, at);

        assert!(!child.mutation_lineage.is_empty());
        assert_eq!(
            &grandchild.mutation_lineage[..child.mutation_lineage.len()],
            &child.mutation_lineage[..]
        );
        assert!(grandchild.mutation_lineage.len() > child.mutation_lineage.len());
        assert!(grandchild.mutation_lineage[child.mutation_lineage.len()..]
            .iter()
            .all(|e| e.generation == 2));
    }

    #[test]
    fn test_lineage_records_old_and_new_values() {
        let policy = MutationPolicy::default();
        let parent = parent();
        let child = spawn_seeded(&parent, 1, &policy, 3, Utc::now());
        for event in &child.mutation_lineage {
            assert_eq!(parent.value_of(event.parameter), Some(event.old.clone()));
            assert_eq!(child.value_of(event.parameter), Some(event.new.clone()));
        }
    }

    #[test]
    fn test_categorical_redraw_keeps_venues_unique() {
        let policy = MutationPolicy {
            categorical_redraw_probability: 1.0,
            ..MutationPolicy::default()
        };
        let child = spawn_seeded(&parent(), 1, &policy, 11, Utc::now());
        let mut venues = child.preferred_venues.clone();
        venues.sort();
        venues.dedup();
        assert_eq!(venues.len(), child.preferred_venues.len());
        assert_ne!(child.specialization, "jito_mev_hunter");
    }

    #[test]
    fn test_zero_probabilities_copy_parent_verbatim() {
        let policy = MutationPolicy {
            numeric_jitter: 0.0,
            categorical_redraw_probability: 0.0,
            ..MutationPolicy::default()
        };
        let parent = parent();
        let child = spawn_seeded(&parent, 1, &policy, 5, Utc::now());
        assert_eq!(child, parent);
    }

    #[test]
    fn test_apply_mutation_rejects_wrong_kind() {
        let mut genome = parent();
        let err = genome
            .apply_mutation(Gene::SizeVariance, GeneValue::Categorical("x".into()), 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, GenomeError::TypeMismatch { .. }));
        assert!(genome.mutation_lineage.is_empty());
    }

    #[test]
    fn test_apply_mutation_rejects_duplicate_venue() {
        let mut genome = parent();
        let err = genome
            .apply_mutation(
                Gene::PreferredVenue { slot: 1 },
                GeneValue::Categorical("jupiter".into()),
                0,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, GenomeError::DuplicateVenue("jupiter".into()));
    }

    #[test]
    fn test_apply_mutation_keeps_delay_range_ordered() {
        let mut genome = parent();
        let err = genome
            .apply_mutation(Gene::ResponseDelayMin, GeneValue::Numeric(900.0), 0, Utc::now())
            .unwrap_err();
        assert_eq!(err, GenomeError::InvertedDelayRange { min_ms: 900.0, max_ms: 800.0 });

        let err = genome
            .apply_mutation(Gene::ResponseDelayMax, GeneValue::Numeric(150.0), 0, Utc::now())
            .unwrap_err();
        assert_eq!(err, GenomeError::InvertedDelayRange { min_ms: 200.0, max_ms: 150.0 });

        genome
            .apply_mutation(Gene::ResponseDelayMin, GeneValue::Numeric(800.0), 0, Utc::now())
            .unwrap();
        assert_eq!(genome.response_delay_range, DelayRange { min_ms: 800.0, max_ms: 800.0 });
        assert_eq!(genome.mutation_lineage.len(), 1);
    }

    #[test]
    fn test_catch_up_replays_only_newer_entries() {
        let at = Utc::now();
        let mut registry = parent();
        registry
            .apply_mutation(Gene::SizeVariance, GeneValue::Numeric(1.1), 1, at)
            .unwrap();

        let mut newer = registry.clone();
        newer
            .apply_mutation(Gene::SlippageTolerance, GeneValue::Numeric(0.004), 1, at)
            .unwrap();
        assert_eq!(registry.catch_up(&newer), Ok(1));
        assert_eq!(registry.slippage_tolerance, 0.004);
        assert_eq!(registry.mutation_lineage, newer.mutation_lineage);

        // A copy taken before the in-life mutations never rolls them back.
        let stale = parent();
        assert_eq!(registry.catch_up(&stale), Ok(0));
        assert_eq!(registry.size_variance, 1.1);
        assert_eq!(registry.mutation_lineage.len(), 2);
    }
}
