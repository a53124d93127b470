// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Opportunities and their content-addressed fingerprints.

use crate::domain::clone::CloneId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-addressed identifier of a trading opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 over `venue|asset|strategy|time_bucket`, hex encoded.
    ///
    /// Venue, asset and strategy are lower-cased so that collaborators
    /// reporting the same opportunity with different casing collide.
    pub fn compute(venue: &str, asset: &str, strategy: &str, time_bucket: i64) -> Self {
        let canonical = format!(
            "{}|{}|{}|{}",
            venue.trim().to_lowercase(),
            asset.trim().to_lowercase(),
            strategy.trim().to_lowercase(),
            time_bucket
        );
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    /// Time bucket of `at` for a bucket width in seconds.
    pub fn time_bucket(at: DateTime<Utc>, bucket_secs: i64) -> i64 {
        at.timestamp().div_euclid(bucket_secs.max(1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered, time-limited trading opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub fingerprint: Fingerprint,
    pub discovered_by: CloneId,
    pub estimated_profit: f64,
    pub discovery_time: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl Opportunity {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}
