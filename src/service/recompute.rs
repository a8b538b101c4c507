//! Recompute engine: derives metrics from full reads and writes them into
//! the current snapshot.
//!
//! Every write goes through one critical section covering "read current
//! snapshot → recompute owned fields → compare-and-swap". The in-process
//! mutex serializes the two listeners; the store-level version check
//! catches writers in other processes, and a lost race restarts the whole
//! cycle with a fresh read.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::{
    Collection, ContentRecord, EventBus, SnapshotPatch, StatsEvent, StatsSnapshot, UpdateOutcome,
    UserMetrics, UserRecord,
};
use crate::error::StatsError;
use crate::persistence::SnapshotStore;
use crate::source::SourceCollections;

/// Result of [`RecomputeEngine::seed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    /// No snapshot existed; this one was computed and stored.
    Created(StatsSnapshot),
    /// A current snapshot already existed; nothing was written.
    AlreadySeeded(StatsSnapshot),
}

impl SeedOutcome {
    /// The current snapshot after seeding.
    #[must_use]
    pub const fn snapshot(&self) -> &StatsSnapshot {
        match self {
            Self::Created(s) | Self::AlreadySeeded(s) => s,
        }
    }

    /// `true` when seeding wrote a new snapshot.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Per-collection metric handlers sharing one snapshot store.
#[derive(Debug)]
pub struct RecomputeEngine {
    store: Arc<dyn SnapshotStore>,
    collections: Arc<dyn SourceCollections>,
    event_bus: EventBus,
    write_lock: Mutex<()>,
    conflict_retry_limit: u32,
}

impl RecomputeEngine {
    /// Creates an engine.
    ///
    /// `conflict_retry_limit` bounds the read-compute-write cycles attempted
    /// per recomputation; it is raised to at least one.
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        collections: Arc<dyn SourceCollections>,
        event_bus: EventBus,
        conflict_retry_limit: u32,
    ) -> Self {
        Self {
            store,
            collections,
            event_bus,
            write_lock: Mutex::new(()),
            conflict_retry_limit: conflict_retry_limit.max(1),
        }
    }

    /// Returns the snapshot store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Returns the event bus.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Sums the view counters over the whole content catalog.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Source`] if the catalog can not be read.
    pub async fn compute_views(&self) -> Result<u64, StatsError> {
        let documents = self.collections.list_all(Collection::Content).await?;
        Ok(sum_views(&documents))
    }

    /// Counts active subscriptions and all user accounts.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Source`] if the accounts can not be read.
    pub async fn compute_user_metrics(&self) -> Result<UserMetrics, StatsError> {
        let documents = self.collections.list_all(Collection::Users).await?;
        Ok(count_users(&documents))
    }

    /// Creates the first snapshot from a full computation, unless a current
    /// snapshot already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Source`] or [`StatsError::PersistenceError`]
    /// when the computation or the write fails.
    pub async fn seed(&self) -> Result<SeedOutcome, StatsError> {
        let _guard = self.write_lock.lock().await;

        if let Some(existing) = self.store.get_current().await? {
            tracing::info!(snapshot_id = %existing.id, "statistics already seeded");
            return Ok(SeedOutcome::AlreadySeeded(existing));
        }

        let views = self.compute_views().await?;
        let metrics = self.compute_user_metrics().await?;
        let seeded = self
            .store
            .create_if_empty(StatsSnapshot::new(views, metrics.subscriptions, metrics.users))
            .await?;
        let Some(created) = seeded else {
            // Another process sharing the store seeded in the meantime.
            let existing = self.store.get_current().await?.ok_or(StatsError::SnapshotMissing)?;
            tracing::info!(snapshot_id = %existing.id, "statistics seeded by another engine");
            return Ok(SeedOutcome::AlreadySeeded(existing));
        };

        tracing::info!(
            snapshot_id = %created.id,
            views = created.views,
            subscriptions = created.subscriptions,
            users = created.users,
            "statistics seeded"
        );
        let _ = self.event_bus.publish(StatsEvent::SnapshotSeeded {
            snapshot_id: created.id,
            views: created.views,
            subscriptions: created.subscriptions,
            users: created.users,
            timestamp: Utc::now(),
        });

        Ok(SeedOutcome::Created(created))
    }

    /// Content-change handler: rewrites `views` from a full catalog read.
    ///
    /// # Errors
    ///
    /// See [`RecomputeEngine::recompute`].
    pub async fn handle_content_change(&self) -> Result<StatsSnapshot, StatsError> {
        self.recompute(Collection::Content).await
    }

    /// User-change handler: rewrites `subscriptions` and `users` from a full
    /// read of the accounts.
    ///
    /// # Errors
    ///
    /// See [`RecomputeEngine::recompute`].
    pub async fn handle_user_change(&self) -> Result<StatsSnapshot, StatsError> {
        self.recompute(Collection::Users).await
    }

    /// Recomputes the metrics owned by `collection` and writes them into the
    /// current snapshot.
    ///
    /// # Errors
    ///
    /// - [`StatsError::SnapshotMissing`] if there is no current snapshot.
    /// - [`StatsError::Source`] if the collection read fails.
    /// - [`StatsError::Conflict`] if every compare-and-swap attempt lost.
    /// - [`StatsError::PersistenceError`] if the store fails.
    pub async fn recompute(&self, collection: Collection) -> Result<StatsSnapshot, StatsError> {
        let _guard = self.write_lock.lock().await;

        for attempt in 1..=self.conflict_retry_limit {
            let current = self
                .store
                .get_current()
                .await?
                .ok_or(StatsError::SnapshotMissing)?;

            let patch = match collection {
                Collection::Content => SnapshotPatch::content(self.compute_views().await?),
                Collection::Users => {
                    let metrics = self.compute_user_metrics().await?;
                    SnapshotPatch::users(metrics.subscriptions, metrics.users)
                }
            };

            match self.store.update(current.id, &patch, current.version).await? {
                UpdateOutcome::Applied(updated) => {
                    tracing::debug!(
                        %collection,
                        snapshot_id = %updated.id,
                        version = updated.version,
                        views = updated.views,
                        subscriptions = updated.subscriptions,
                        users = updated.users,
                        "snapshot updated"
                    );
                    let _ = self.event_bus.publish(StatsEvent::SnapshotUpdated {
                        snapshot_id: updated.id,
                        collection,
                        views: updated.views,
                        subscriptions: updated.subscriptions,
                        users: updated.users,
                        version: updated.version,
                        timestamp: Utc::now(),
                    });
                    return Ok(updated);
                }
                UpdateOutcome::Conflict => {
                    tracing::warn!(
                        %collection,
                        snapshot_id = %current.id,
                        attempt,
                        "snapshot write conflicted, retrying with a fresh read"
                    );
                }
            }
        }

        Err(StatsError::Conflict {
            attempts: self.conflict_retry_limit,
        })
    }

    /// Appends a new snapshot carrying the current metrics; the previous
    /// one becomes immutable history.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::SnapshotMissing`] if there is nothing to roll,
    /// or [`StatsError::PersistenceError`] if the write fails.
    pub async fn roll_snapshot(&self) -> Result<StatsSnapshot, StatsError> {
        let _guard = self.write_lock.lock().await;

        let current = self
            .store
            .get_current()
            .await?
            .ok_or(StatsError::SnapshotMissing)?;

        let mut next = StatsSnapshot::new(current.views, current.subscriptions, current.users);
        next.created_at = next.created_at.max(current.created_at);
        let created = self.store.create(next).await?;

        tracing::info!(previous_id = %current.id, snapshot_id = %created.id, "snapshot rolled");
        let _ = self.event_bus.publish(StatsEvent::SnapshotRolled {
            previous_id: current.id,
            snapshot_id: created.id,
            timestamp: Utc::now(),
        });

        Ok(created)
    }
}

/// Identifier of a source document for log lines.
fn document_label(document: &serde_json::Value) -> String {
    document
        .get("id")
        .or_else(|| document.get("_id"))
        .map_or_else(|| "<unknown>".to_string(), ToString::to_string)
}

/// Sums `views` over the catalog, skipping undecodable documents.
#[must_use]
pub fn sum_views(documents: &[serde_json::Value]) -> u64 {
    documents
        .iter()
        .filter_map(|doc| match ContentRecord::deserialize(doc) {
            Ok(record) => Some(record.views),
            Err(e) => {
                tracing::warn!(document = %document_label(doc), error = %e, "skipping malformed content record");
                None
            }
        })
        .fold(0_u64, u64::saturating_add)
}

/// Counts accounts and active subscriptions, skipping undecodable documents.
#[must_use]
pub fn count_users(documents: &[serde_json::Value]) -> UserMetrics {
    documents
        .iter()
        .filter_map(|doc| match UserRecord::deserialize(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(document = %document_label(doc), error = %e, "skipping malformed user record");
                None
            }
        })
        .fold(UserMetrics::default(), |mut metrics, user| {
            metrics.users = metrics.users.saturating_add(1);
            if user.is_active_subscriber() {
                metrics.subscriptions = metrics.subscriptions.saturating_add(1);
            }
            metrics
        })
}
