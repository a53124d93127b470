// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Snapshot Repository Interface
//!
//! Persistence contract for [`CoordinatorSnapshot`]. The interface lives in
//! the domain layer; implementations live in
//! `crate::infrastructure::repositories`.
//!
//! | Implementation | Backing store |
//! |----------------|---------------|
//! | `InMemorySnapshotRepository` | process memory, tests and simulations |
//! | `FileSnapshotRepository` | JSON file, atomically replaced on save |

use crate::domain::snapshot::CoordinatorSnapshot;
use async_trait::async_trait;

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &CoordinatorSnapshot) -> Result<(), RepositoryError>;

    /// Latest stored snapshot, if any was ever saved.
    async fn load(&self) -> Result<Option<CoordinatorSnapshot>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
