// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::repository::{RepositoryError, SnapshotRepository};
use crate::domain::snapshot::{CoordinatorSnapshot, SNAPSHOT_FORMAT_VERSION};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot store backed by a single pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotRepository {
    path: PathBuf,
}

impl FileSnapshotRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotRepository for FileSnapshotRepository {
    async fn save(&self, snapshot: &CoordinatorSnapshot) -> Result<(), RepositoryError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<CoordinatorSnapshot>, RepositoryError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: CoordinatorSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RepositoryError::UnsupportedVersion(snapshot.format_version));
        }
        Ok(Some(snapshot))
    }
}
