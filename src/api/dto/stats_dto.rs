//! Statistics DTOs for snapshot, history and listener endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{SnapshotId, StatsSnapshot};
use crate::service::{DASHBOARD_WINDOW, ListenerHealth};

/// One statistics snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SnapshotDto {
    /// Snapshot identifier.
    pub snapshot_id: SnapshotId,
    /// Total course views.
    pub views: u64,
    /// Active subscriptions.
    pub subscriptions: u64,
    /// Registered users.
    pub users: u64,
    /// Time of the last write to this snapshot.
    pub created_at: DateTime<Utc>,
    /// Number of updates applied since creation.
    pub version: u64,
}

impl From<StatsSnapshot> for SnapshotDto {
    fn from(s: StatsSnapshot) -> Self {
        Self {
            snapshot_id: s.id,
            views: s.views,
            subscriptions: s.subscriptions,
            users: s.users,
            created_at: s.created_at,
            version: s.version,
        }
    }
}

/// Query parameters for `GET /stats/history`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Number of snapshots to return (1-100). Defaults to 12.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HistoryParams {
    /// Requested limit, or the dashboard window when absent.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DASHBOARD_WINDOW)
    }
}

/// Response body for `GET /stats/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Snapshots, newest first.
    pub data: Vec<SnapshotDto>,
    /// Number of entries in `data`.
    pub count: usize,
}

impl From<Vec<StatsSnapshot>> for HistoryResponse {
    fn from(snapshots: Vec<StatsSnapshot>) -> Self {
        let data: Vec<SnapshotDto> = snapshots.into_iter().map(SnapshotDto::from).collect();
        Self {
            count: data.len(),
            data,
        }
    }
}

/// Response body for `GET /stats/listeners`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListenersResponse {
    /// One record per collection listener.
    pub listeners: Vec<ListenerHealth>,
}
