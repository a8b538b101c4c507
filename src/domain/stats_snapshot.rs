//! The aggregate statistics record and its partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SnapshotId;

/// Persisted aggregate statistics.
///
/// Exactly one snapshot is current at any time: the most recently created
/// one. The current snapshot is mutated in place by the listeners; once a
/// newer snapshot is created the old one is history and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Snapshot identifier.
    pub id: SnapshotId,
    /// Sum of view counters over the whole content catalog.
    pub views: u64,
    /// Number of user accounts with an active subscription.
    pub subscriptions: u64,
    /// Total number of user accounts.
    pub users: u64,
    /// Time the snapshot was last written.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every update.
    pub version: u64,
}

impl StatsSnapshot {
    /// Creates a fresh, unversioned snapshot stamped with the current time.
    #[must_use]
    pub fn new(views: u64, subscriptions: u64, users: u64) -> Self {
        Self {
            id: SnapshotId::new(),
            views,
            subscriptions,
            users,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// Applies a patch in place and bumps the version.
    ///
    /// `created_at` never moves backwards, so an applied patch can not make
    /// an older snapshot look current again.
    pub fn apply(&mut self, patch: &SnapshotPatch) {
        if let Some(views) = patch.views {
            self.views = views;
        }
        if let Some(subscriptions) = patch.subscriptions {
            self.subscriptions = subscriptions;
        }
        if let Some(users) = patch.users {
            self.users = users;
        }
        self.created_at = self.created_at.max(patch.created_at);
        self.version = self.version.saturating_add(1);
    }
}

/// Field-level update of the current snapshot.
///
/// `None` fields are left untouched, so the content listener and the user
/// listener never overwrite each other's metrics. `created_at` is always
/// written and reflects whichever update landed last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPatch {
    /// New `views` value, if owned by the writer.
    pub views: Option<u64>,
    /// New `subscriptions` value, if owned by the writer.
    pub subscriptions: Option<u64>,
    /// New `users` value, if owned by the writer.
    pub users: Option<u64>,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

impl SnapshotPatch {
    /// Patch written by the content listener.
    #[must_use]
    pub fn content(views: u64) -> Self {
        Self {
            views: Some(views),
            subscriptions: None,
            users: None,
            created_at: Utc::now(),
        }
    }

    /// Patch written by the user listener.
    #[must_use]
    pub fn users(subscriptions: u64, users: u64) -> Self {
        Self {
            views: None,
            subscriptions: Some(subscriptions),
            users: Some(users),
            created_at: Utc::now(),
        }
    }
}

/// Result of a compare-and-swap update on the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The patch was applied; carries the stored snapshot.
    Applied(StatsSnapshot),
    /// The snapshot was no longer current or its version moved on.
    Conflict,
}
