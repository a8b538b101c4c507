//! Database row models for snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{SnapshotId, StatsSnapshot};

/// A row of the `stats_snapshots` table.
///
/// Counters are `BIGINT` in PostgreSQL and therefore signed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Snapshot identifier.
    pub id: Uuid,
    /// Total views.
    pub views: i64,
    /// Active subscriptions.
    pub subscriptions: i64,
    /// Total users.
    pub users: i64,
    /// Last write timestamp.
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: i64,
}

/// Column tuple as returned by `SELECT id, views, subscriptions, users, created_at, version`.
pub type SnapshotTuple = (Uuid, i64, i64, i64, DateTime<Utc>, i64);

impl From<SnapshotTuple> for SnapshotRow {
    fn from((id, views, subscriptions, users, created_at, version): SnapshotTuple) -> Self {
        Self {
            id,
            views,
            subscriptions,
            users,
            created_at,
            version,
        }
    }
}

impl From<SnapshotRow> for StatsSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: SnapshotId::from_uuid(row.id),
            views: to_unsigned(row.views),
            subscriptions: to_unsigned(row.subscriptions),
            users: to_unsigned(row.users),
            created_at: row.created_at,
            version: to_unsigned(row.version),
        }
    }
}

/// Clamps a counter coming from the database into `u64`.
#[must_use]
pub fn to_unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Converts a counter into a `BIGINT` bind value, saturating at `i64::MAX`.
#[must_use]
pub fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
