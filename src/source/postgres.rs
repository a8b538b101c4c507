//! PostgreSQL source: LISTEN/NOTIFY change feed and table scans.
//!
//! Row triggers installed by the migrations publish
//! `{"op": "<insert|update|delete>", "id": "<row id>"}` on one channel per
//! collection. NOTIFY has no replay, so resuming is never possible: every
//! resubscription with a token fails with
//! [`StatsError::ResumeTokenInvalid`] and the supervisor falls back to a
//! full recomputation. A lost listener connection is reported the same way
//! instead of being reconnected behind the subscriber's back.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;

use super::{ChangeSource, ChangeStream, SourceCollections};
use crate::domain::{ChangeEvent, Collection, OperationKind, ResumeToken};
use crate::error::StatsError;

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    #[serde(default = "unknown_operation")]
    op: OperationKind,
    #[serde(default)]
    id: Option<String>,
}

const fn unknown_operation() -> OperationKind {
    OperationKind::Other
}

/// Turns a NOTIFY payload into a change event.
///
/// The payload is advisory only; an unreadable payload still yields an
/// event so the collection gets recomputed.
fn parse_notification(collection: Collection, payload: &str, sequence: u64) -> ChangeEvent {
    let (operation, document_id) = match serde_json::from_str::<NotifyPayload>(payload) {
        Ok(p) => (p.op, p.id),
        Err(e) => {
            tracing::warn!(%collection, error = %e, payload, "unreadable change payload");
            (OperationKind::Other, None)
        }
    };
    ChangeEvent::new(collection, operation, document_id, ResumeToken::new(sequence))
}

/// Maps one `try_recv` outcome to a stream item.
///
/// `Ok(None)` means the connection was lost. Notifications sent while it was
/// down are gone, so the subscriber has to resync.
fn received_to_event(
    collection: Collection,
    received: Result<Option<String>, sqlx::Error>,
    sequence: u64,
) -> Result<ChangeEvent, StatsError> {
    match received {
        Ok(Some(payload)) => Ok(parse_notification(collection, &payload, sequence)),
        Ok(None) => {
            tracing::warn!(%collection, "notification connection lost");
            Err(StatsError::ResumeTokenInvalid(collection))
        }
        Err(e) => Err(StatsError::Transport(e.to_string())),
    }
}

/// Change source backed by `PgListener`.
#[derive(Debug, Clone)]
pub struct PgChangeSource {
    pool: PgPool,
}

impl PgChangeSource {
    /// Creates a change source sharing the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeSource for PgChangeSource {
    async fn subscribe(
        &self,
        collection: Collection,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, StatsError> {
        if resume_after.is_some() {
            return Err(StatsError::ResumeTokenInvalid(collection));
        }

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StatsError::Transport(e.to_string()))?;
        listener
            .listen(collection.channel())
            .await
            .map_err(|e| StatsError::Transport(e.to_string()))?;

        tracing::debug!(%collection, channel = collection.channel(), "listening for changes");

        let stream = futures_util::stream::unfold(
            (listener, 0_u64, false),
            move |(mut listener, sequence, failed)| async move {
                if failed {
                    return None;
                }
                let received = listener
                    .try_recv()
                    .await
                    .map(|n| n.map(|n| n.payload().to_owned()));
                match received_to_event(collection, received, sequence.saturating_add(1)) {
                    Ok(event) => {
                        let sequence = event.resume_token.sequence();
                        Some((Ok(event), (listener, sequence, false)))
                    }
                    Err(e) => Some((Err(e), (listener, sequence, true))),
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

/// Full table reads, shaped like the documents the engine decodes.
#[derive(Debug, Clone)]
pub struct PgCollections {
    pool: PgPool,
}

impl PgCollections {
    /// Creates a reader sharing the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceCollections for PgCollections {
    async fn list_all(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StatsError> {
        let sql = match collection {
            Collection::Content => "SELECT jsonb_build_object('id', id, 'views', views) FROM courses",
            Collection::Users => {
                "SELECT jsonb_build_object('id', id, 'subscription', \
                     jsonb_build_object('id', subscription_id, 'status', subscription_status)) \
                 FROM users"
            }
        };

        sqlx::query_scalar::<_, serde_json::Value>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StatsError::Source(e.to_string()))
    }
}
