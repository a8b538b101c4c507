//! In-memory snapshot store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SnapshotStore;
use crate::domain::{SnapshotId, SnapshotPatch, StatsSnapshot, UpdateOutcome};
use crate::error::StatsError;

/// Snapshot store backed by a `RwLock<Vec<_>>`.
///
/// Snapshots are kept in creation order. The current one is the entry with
/// the latest `created_at`; ties go to the later insertion.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<StatsSnapshot>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Returns `true` if no snapshot was ever created.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

fn current_index(snapshots: &[StatsSnapshot]) -> Option<usize> {
    snapshots
        .iter()
        .enumerate()
        .max_by_key(|(idx, s)| (s.created_at, *idx))
        .map(|(idx, _)| idx)
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_current(&self) -> Result<Option<StatsSnapshot>, StatsError> {
        let snapshots = self.snapshots.read().await;
        Ok(current_index(&snapshots).and_then(|idx| snapshots.get(idx).cloned()))
    }

    async fn create(&self, snapshot: StatsSnapshot) -> Result<StatsSnapshot, StatsError> {
        let mut snapshots = self.snapshots.write().await;
        if snapshots.iter().any(|s| s.id == snapshot.id) {
            return Err(StatsError::PersistenceError(format!(
                "snapshot {} already exists",
                snapshot.id
            )));
        }
        snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn create_if_empty(
        &self,
        snapshot: StatsSnapshot,
    ) -> Result<Option<StatsSnapshot>, StatsError> {
        let mut snapshots = self.snapshots.write().await;
        if !snapshots.is_empty() {
            return Ok(None);
        }
        snapshots.push(snapshot.clone());
        Ok(Some(snapshot))
    }

    async fn update(
        &self,
        id: SnapshotId,
        patch: &SnapshotPatch,
        expected_version: u64,
    ) -> Result<UpdateOutcome, StatsError> {
        let mut snapshots = self.snapshots.write().await;
        let Some(idx) = current_index(&snapshots) else {
            return Ok(UpdateOutcome::Conflict);
        };
        let Some(current) = snapshots.get_mut(idx) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if current.id != id || current.version != expected_version {
            return Ok(UpdateOutcome::Conflict);
        }
        current.apply(patch);
        Ok(UpdateOutcome::Applied(current.clone()))
    }

    async fn history(&self, limit: usize) -> Result<Vec<StatsSnapshot>, StatsError> {
        let snapshots = self.snapshots.read().await;
        let mut ordered: Vec<(usize, &StatsSnapshot)> = snapshots.iter().enumerate().collect();
        ordered.sort_by(|(ia, a), (ib, b)| (b.created_at, *ib).cmp(&(a.created_at, *ia)));
        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|(_, s)| s.clone())
            .collect())
    }
}
