// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of
//! [`SnapshotRepository`](crate::domain::repository::SnapshotRepository).
//!
//! - **InMemorySnapshotRepository** - keeps the latest snapshot in memory
//! - **FileSnapshotRepository** - JSON file, written to a sibling temp file
//!   and renamed into place so readers never observe a partial write

pub mod file;

pub use file::FileSnapshotRepository;

use crate::domain::repository::{RepositoryError, SnapshotRepository};
use crate::domain::snapshot::CoordinatorSnapshot;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemorySnapshotRepository {
    latest: Arc<RwLock<Option<CoordinatorSnapshot>>>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn save(&self, snapshot: &CoordinatorSnapshot) -> Result<(), RepositoryError> {
        *self.latest.write() = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CoordinatorSnapshot>, RepositoryError> {
        Ok(self.latest.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::PoolState;
    use crate::domain::snapshot::SNAPSHOT_FORMAT_VERSION;
    use chrono::Utc;

    #[test]
    fn test_in_memory_keeps_latest() {
        let repo = InMemorySnapshotRepository::new();
        assert!(tokio_test::block_on(repo.load()).unwrap().is_none());

        let mut snapshot = CoordinatorSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: Utc::now(),
            claims: vec![],
            reservations: vec![],
            pool: PoolState::new(500.0),
            heartbeats: vec![],
            clones: vec![],
        };
        tokio_test::block_on(repo.save(&snapshot)).unwrap();
        snapshot.pool = PoolState::new(750.0);
        tokio_test::block_on(repo.save(&snapshot)).unwrap();

        let loaded = tokio_test::block_on(repo.load()).unwrap().unwrap();
        assert_eq!(loaded.pool.total_balance, 750.0);
    }
}
