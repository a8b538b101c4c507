//! Persistence layer: the snapshot store.
//!
//! [`SnapshotStore`] is the only shared mutable resource of the engine. It
//! offers a compare-and-swap update keyed by snapshot id and version so
//! that two writers can never silently clobber each other. Two
//! implementations exist: [`memory::MemorySnapshotStore`] for tests and
//! single-process deployments, and [`postgres::PostgresSnapshotStore`].

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{SnapshotId, SnapshotPatch, StatsSnapshot, UpdateOutcome};
use crate::error::StatsError;

pub use memory::MemorySnapshotStore;
pub use postgres::PostgresSnapshotStore;

/// Durable storage for statistics snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Returns the current snapshot: the most recently created one.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the store cannot be read.
    async fn get_current(&self) -> Result<Option<StatsSnapshot>, StatsError>;

    /// Appends a snapshot, which becomes the current one.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the write fails.
    async fn create(&self, snapshot: StatsSnapshot) -> Result<StatsSnapshot, StatsError>;

    /// Appends `snapshot` only if the store holds no snapshot at all.
    ///
    /// Returns `None` when another writer seeded first. The check and the
    /// insert are atomic across every process sharing the store.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the write fails.
    async fn create_if_empty(
        &self,
        snapshot: StatsSnapshot,
    ) -> Result<Option<StatsSnapshot>, StatsError>;

    /// Applies `patch` to snapshot `id` if it is still current and its
    /// version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the write fails. A lost
    /// race is not an error; it is reported as [`UpdateOutcome::Conflict`].
    async fn update(
        &self,
        id: SnapshotId,
        patch: &SnapshotPatch,
        expected_version: u64,
    ) -> Result<UpdateOutcome, StatsError>;

    /// Returns up to `limit` snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the store cannot be read.
    async fn history(&self, limit: usize) -> Result<Vec<StatsSnapshot>, StatsError>;
}
