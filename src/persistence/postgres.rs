//! PostgreSQL implementation of the snapshot store.

use async_trait::async_trait;
use sqlx::PgPool;

use super::SnapshotStore;
use super::models::{SnapshotRow, SnapshotTuple, to_signed};
use crate::domain::{SnapshotId, SnapshotPatch, StatsSnapshot, UpdateOutcome};
use crate::error::StatsError;

const SNAPSHOT_COLUMNS: &str = "id, views, subscriptions, users, created_at, version";

/// Advisory lock key serializing seed inserts across processes.
const SEED_LOCK_KEY: i64 = 0x5354_4154_5345_4544;

/// PostgreSQL-backed snapshot store using `sqlx::PgPool`.
///
/// The compare-and-swap update only matches a row that is both the
/// current snapshot and at the expected version, so concurrent engine
/// processes sharing one database can not lose each other's writes.
#[derive(Debug, Clone)]
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations (snapshot table and change triggers).
    ///
    /// # Errors
    ///
    /// Returns a [`StatsError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StatsError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StatsError::PersistenceError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn get_current(&self) -> Result<Option<StatsSnapshot>, StatsError> {
        let row = sqlx::query_as::<_, SnapshotTuple>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stats_snapshots \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|t| StatsSnapshot::from(SnapshotRow::from(t))))
    }

    async fn create(&self, snapshot: StatsSnapshot) -> Result<StatsSnapshot, StatsError> {
        let row = sqlx::query_as::<_, SnapshotTuple>(&format!(
            "INSERT INTO stats_snapshots (id, views, subscriptions, users, created_at, version) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(*snapshot.id.as_uuid())
        .bind(to_signed(snapshot.views))
        .bind(to_signed(snapshot.subscriptions))
        .bind(to_signed(snapshot.users))
        .bind(snapshot.created_at)
        .bind(to_signed(snapshot.version))
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(snapshot_id = %snapshot.id, "inserted stats snapshot");
        Ok(StatsSnapshot::from(SnapshotRow::from(row)))
    }

    async fn create_if_empty(
        &self,
        snapshot: StatsSnapshot,
    ) -> Result<Option<StatsSnapshot>, StatsError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEED_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, SnapshotTuple>(&format!(
            "INSERT INTO stats_snapshots (id, views, subscriptions, users, created_at, version) \
             SELECT $1, $2, $3, $4, $5, $6 \
             WHERE NOT EXISTS (SELECT 1 FROM stats_snapshots) \
             RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(*snapshot.id.as_uuid())
        .bind(to_signed(snapshot.views))
        .bind(to_signed(snapshot.subscriptions))
        .bind(to_signed(snapshot.users))
        .bind(snapshot.created_at)
        .bind(to_signed(snapshot.version))
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        if row.is_some() {
            tracing::debug!(snapshot_id = %snapshot.id, "inserted seed snapshot");
        }
        Ok(row.map(|t| StatsSnapshot::from(SnapshotRow::from(t))))
    }

    async fn update(
        &self,
        id: SnapshotId,
        patch: &SnapshotPatch,
        expected_version: u64,
    ) -> Result<UpdateOutcome, StatsError> {
        let row = sqlx::query_as::<_, SnapshotTuple>(&format!(
            "UPDATE stats_snapshots SET \
                 views = COALESCE($3, views), \
                 subscriptions = COALESCE($4, subscriptions), \
                 users = COALESCE($5, users), \
                 created_at = GREATEST(created_at, $6), \
                 version = version + 1 \
             WHERE id = $1 AND version = $2 \
               AND id = (SELECT id FROM stats_snapshots ORDER BY created_at DESC, seq DESC LIMIT 1) \
             RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(*id.as_uuid())
        .bind(to_signed(expected_version))
        .bind(patch.views.map(to_signed))
        .bind(patch.subscriptions.map(to_signed))
        .bind(patch.users.map(to_signed))
        .bind(patch.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(t) => UpdateOutcome::Applied(StatsSnapshot::from(SnapshotRow::from(t))),
            None => UpdateOutcome::Conflict,
        })
    }

    async fn history(&self, limit: usize) -> Result<Vec<StatsSnapshot>, StatsError> {
        let rows = sqlx::query_as::<_, SnapshotTuple>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM stats_snapshots \
             ORDER BY created_at DESC, seq DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|t| StatsSnapshot::from(SnapshotRow::from(t)))
            .collect())
    }
}
