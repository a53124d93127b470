// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Knowledge Fragments
//!
//! Facts discovered by one clone and spread through the swarm with
//! deliberate fidelity loss. Fragments are immutable: every hop derives a new
//! fragment with higher `propagation_distance` and no greater `accuracy`.

use crate::domain::clone::CloneId;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFragment {
    pub id: Uuid,
    /// Identifies the underlying fact; fragments with the same key conflict.
    pub fact_key: String,
    pub origin_clone_id: CloneId,
    pub origin_timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub accuracy: f64,
    pub propagation_distance: u32,
}

/// Per-hop fidelity loss parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayModel {
    pub decay_per_hop: f64,
    /// Half-width of the symmetric uniform noise added at each hop.
    pub noise_amplitude: f64,
}

impl Default for DecayModel {
    fn default() -> Self {
        Self {
            decay_per_hop: 0.1,
            noise_amplitude: 0.02,
        }
    }
}

impl DecayModel {
    /// Accuracy after one more hop. Never exceeds `accuracy`, never leaves `[0, 1]`.
    pub fn next_accuracy<R: Rng>(&self, accuracy: f64, rng: &mut R) -> f64 {
        let noise = if self.noise_amplitude > 0.0 {
            rng.random_range(-self.noise_amplitude..=self.noise_amplitude)
        } else {
            0.0
        };
        let decayed = ((accuracy - self.decay_per_hop).max(0.0) + noise).clamp(0.0, 1.0);
        decayed.min(accuracy)
    }
}

impl KnowledgeFragment {
    pub fn new(
        fact_key: impl Into<String>,
        origin_clone_id: CloneId,
        origin_timestamp: DateTime<Utc>,
        payload: serde_json::Value,
        accuracy: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fact_key: fact_key.into(),
            origin_clone_id,
            origin_timestamp,
            payload,
            accuracy: accuracy.clamp(0.0, 1.0),
            propagation_distance: 0,
        }
    }

    /// Derive the fragment one hop further away, or `None` once accuracy
    /// has decayed to zero.
    pub fn derive_hop<R: Rng>(&self, model: &DecayModel, rng: &mut R) -> Option<Self> {
        let accuracy = model.next_accuracy(self.accuracy, rng);
        if accuracy <= 0.0 {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            fact_key: self.fact_key.clone(),
            origin_clone_id: self.origin_clone_id,
            origin_timestamp: self.origin_timestamp,
            payload: self.payload.clone(),
            accuracy,
            propagation_distance: self.propagation_distance + 1,
        })
    }

    /// Conflict resolution: higher accuracy wins, ties go to the most recent
    /// origin timestamp.
    pub fn supersedes(&self, other: &KnowledgeFragment) -> bool {
        if self.accuracy != other.accuracy {
            return self.accuracy > other.accuracy;
        }
        self.origin_timestamp > other.origin_timestamp
    }
}
