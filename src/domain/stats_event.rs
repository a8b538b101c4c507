//! Engine events reflecting snapshot writes and listener health.
//!
//! Every snapshot write and every listener state transition emits a
//! [`StatsEvent`] through the [`super::EventBus`]. Events are broadcast to
//! WebSocket subscribers and double as the operational health signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Collection, ListenerState, SnapshotId};

/// Broad event category used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// Snapshot seeded, updated or rolled.
    Snapshot,
    /// Listener state changes and failures.
    Listener,
}

impl EventTopic {
    /// Parses a topic name; returns `None` for unknown names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "snapshot" => Some(Self::Snapshot),
            "listener" => Some(Self::Listener),
            _ => None,
        }
    }
}

/// Event emitted by the statistics engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StatsEvent {
    /// The first snapshot was created from a full computation.
    SnapshotSeeded {
        /// Snapshot identifier.
        snapshot_id: SnapshotId,
        /// Total views.
        views: u64,
        /// Active subscriptions.
        subscriptions: u64,
        /// Total users.
        users: u64,
        /// Seed timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A listener rewrote its metrics on the current snapshot.
    SnapshotUpdated {
        /// Snapshot identifier.
        snapshot_id: SnapshotId,
        /// Collection whose change triggered the write.
        collection: Collection,
        /// Total views after the write.
        views: u64,
        /// Active subscriptions after the write.
        subscriptions: u64,
        /// Total users after the write.
        users: u64,
        /// Snapshot version after the write.
        version: u64,
        /// Write timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A new snapshot superseded the previous current one.
    SnapshotRolled {
        /// Snapshot that became history.
        previous_id: SnapshotId,
        /// New current snapshot.
        snapshot_id: SnapshotId,
        /// Rollover timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A listener moved to a new connection state.
    ListenerStateChanged {
        /// Listener's collection.
        collection: Collection,
        /// New state.
        state: ListenerState,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A recomputation failed and will be retried.
    RecomputeFailed {
        /// Listener's collection.
        collection: Collection,
        /// Failure description.
        error: String,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A listener crossed the consecutive failure threshold.
    ListenerUnhealthy {
        /// Listener's collection.
        collection: Collection,
        /// Failures in a row so far.
        consecutive_failures: u32,
        /// Timestamp of the failure that crossed the threshold.
        timestamp: DateTime<Utc>,
    },
}

impl StatsEvent {
    /// Returns the topic this event is published under.
    #[must_use]
    pub const fn topic(&self) -> EventTopic {
        match self {
            Self::SnapshotSeeded { .. }
            | Self::SnapshotUpdated { .. }
            | Self::SnapshotRolled { .. } => EventTopic::Snapshot,
            Self::ListenerStateChanged { .. }
            | Self::RecomputeFailed { .. }
            | Self::ListenerUnhealthy { .. } => EventTopic::Listener,
        }
    }

    /// Returns the collection the event concerns, if any.
    #[must_use]
    pub const fn collection(&self) -> Option<Collection> {
        match self {
            Self::SnapshotUpdated { collection, .. }
            | Self::ListenerStateChanged { collection, .. }
            | Self::RecomputeFailed { collection, .. }
            | Self::ListenerUnhealthy { collection, .. } => Some(*collection),
            Self::SnapshotSeeded { .. } | Self::SnapshotRolled { .. } => None,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::SnapshotSeeded { .. } => "snapshot_seeded",
            Self::SnapshotUpdated { .. } => "snapshot_updated",
            Self::SnapshotRolled { .. } => "snapshot_rolled",
            Self::ListenerStateChanged { .. } => "listener_state_changed",
            Self::RecomputeFailed { .. } => "recompute_failed",
            Self::ListenerUnhealthy { .. } => "listener_unhealthy",
        }
    }
}
