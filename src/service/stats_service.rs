//! Read side of the statistics: current snapshot, history, dashboard.

use std::sync::Arc;

use super::dashboard::{DASHBOARD_WINDOW, DashboardStats};
use crate::domain::StatsSnapshot;
use crate::error::StatsError;
use crate::persistence::SnapshotStore;

/// Largest history page served at once.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Read-only access to the statistics snapshots.
///
/// Never writes; every mutation belongs to the recompute engine.
#[derive(Debug, Clone)]
pub struct StatsService {
    store: Arc<dyn SnapshotStore>,
}

impl StatsService {
    /// Creates a service reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Returns the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::SnapshotMissing`] before the first seed, or
    /// [`StatsError::PersistenceError`] if the store cannot be read.
    pub async fn current(&self) -> Result<StatsSnapshot, StatsError> {
        self.store
            .get_current()
            .await?
            .ok_or(StatsError::SnapshotMissing)
    }

    /// Returns up to `limit` snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::InvalidRequest`] if `limit` is outside
    /// `1..=MAX_HISTORY_LIMIT`.
    pub async fn history(&self, limit: usize) -> Result<Vec<StatsSnapshot>, StatsError> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(StatsError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )));
        }
        self.store.history(limit).await
    }

    /// Builds the admin dashboard from the latest snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::PersistenceError`] if the store cannot be read.
    pub async fn dashboard(&self) -> Result<DashboardStats, StatsError> {
        let recent = self.store.history(DASHBOARD_WINDOW).await?;
        Ok(DashboardStats::from_history(&recent))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemorySnapshotStore;

    fn service() -> (Arc<MemorySnapshotStore>, StatsService) {
        let store = Arc::new(MemorySnapshotStore::new());
        let service = StatsService::new(Arc::clone(&store) as Arc<dyn SnapshotStore>);
        (store, service)
    }

    #[tokio::test]
    async fn current_before_seed_is_missing() {
        let (_, service) = service();
        assert!(matches!(
            service.current().await,
            Err(StatsError::SnapshotMissing)
        ));
    }

    #[tokio::test]
    async fn current_returns_latest() {
        let (store, service) = service();
        let Ok(first) = store.create(StatsSnapshot::new(1, 1, 1)).await else {
            panic!("create failed");
        };
        let mut second = StatsSnapshot::new(2, 2, 2);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let Ok(second) = store.create(second).await else {
            panic!("create failed");
        };

        let Ok(current) = service.current().await else {
            panic!("no current snapshot");
        };
        assert_eq!(current.id, second.id);
    }

    #[tokio::test]
    async fn history_limit_is_validated() {
        let (_, service) = service();
        assert!(matches!(
            service.history(0).await,
            Err(StatsError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.history(MAX_HISTORY_LIMIT + 1).await,
            Err(StatsError::InvalidRequest(_))
        ));
        let Ok(empty) = service.history(MAX_HISTORY_LIMIT).await else {
            panic!("history failed");
        };
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn dashboard_reflects_latest_snapshot() {
        let (store, service) = service();
        let Ok(_) = store.create(StatsSnapshot::new(16, 3, 41)).await else {
            panic!("create failed");
        };
        let Ok(dashboard) = service.dashboard().await else {
            panic!("dashboard failed");
        };
        assert_eq!(dashboard.views.current, 16);
        assert_eq!(dashboard.users.current, 41);
        assert_eq!(dashboard.stats.len(), DASHBOARD_WINDOW);
    }
}
