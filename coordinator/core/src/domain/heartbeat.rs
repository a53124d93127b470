// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Heartbeat records and the partial state snapshots clones ship with them.

use crate::domain::clone::CloneId;
use crate::domain::genome::Genome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Partial copy of a sibling's state retained by another clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiblingCopy {
    /// Fraction in `[0, 1]` of the sibling's state this copy reconstructs.
    pub coverage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genome: Option<Genome>,
    pub captured_at: DateTime<Utc>,
}

/// State a clone reports with each heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialStateSnapshot {
    /// When the clone produced this snapshot. Orders heartbeats.
    pub taken_at: DateTime<Utc>,
    #[serde(default)]
    pub open_positions: u32,
    #[serde(default)]
    pub realized_pnl: f64,
    /// Copies of siblings' state, keyed by sibling id.
    #[serde(default)]
    pub sibling_copies: HashMap<CloneId, SiblingCopy>,
}

impl PartialStateSnapshot {
    pub fn at(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            open_positions: 0,
            realized_pnl: 0.0,
            sibling_copies: HashMap::new(),
        }
    }

    pub fn with_sibling_copy(mut self, sibling: CloneId, copy: SiblingCopy) -> Self {
        self.sibling_copies.insert(sibling, copy);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub clone_id: CloneId,
    pub last_seen: DateTime<Utc>,
    pub snapshot: PartialStateSnapshot,
}

impl HeartbeatRecord {
    /// Whole heartbeat intervals elapsed since `last_seen`.
    pub fn missed_intervals(&self, now: DateTime<Utc>, interval: std::time::Duration) -> u32 {
        let interval_ms = interval.as_millis().max(1) as i64;
        let elapsed_ms = (now - self.last_seen).num_milliseconds().max(0);
        u32::try_from(elapsed_ms / interval_ms).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatOutcome {
    Recorded,
    /// Older than (or equal to) the recorded heartbeat; discarded.
    Stale,
    /// Sent by a retired clone; discarded.
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missed_intervals() {
        let t = Utc::now();
        let record = HeartbeatRecord {
            clone_id: CloneId(1),
            last_seen: t,
            snapshot: PartialStateSnapshot::at(t),
        };
        let interval = Duration::from_secs(30);

        assert_eq!(record.missed_intervals(t, interval), 0);
        assert_eq!(record.missed_intervals(t + chrono::TimeDelta::seconds(29), interval), 0);
        assert_eq!(record.missed_intervals(t + chrono::TimeDelta::seconds(90), interval), 3);
        assert_eq!(record.missed_intervals(t - chrono::TimeDelta::seconds(90), interval), 0);
    }
}
