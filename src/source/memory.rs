//! In-process document store with a resumable change feed.
//!
//! [`MemoryDocumentStore`] plays both source roles: it holds the documents
//! of each collection and emits a [`ChangeEvent`] for every write. Each
//! collection keeps a bounded replay log so that a subscriber can resume
//! after a dropped subscription; when the log no longer covers the gap the
//! resume fails with [`StatsError::ResumeTokenInvalid`].
//!
//! Fault hooks (`disconnect`, `drop_next_streams`, `mute_notifications`,
//! `forget_history`, `fail_next_reads`, `fail_next_subscriptions`) simulate
//! transport drops, lost notifications and transient read failures.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{Mutex, broadcast};

use super::{ChangeSource, ChangeStream, SourceCollections};
use crate::domain::{ChangeEvent, Collection, OperationKind, ResumeToken};
use crate::error::StatsError;

/// Default number of events retained per collection for resumption.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Feed {
    documents: BTreeMap<String, serde_json::Value>,
    log: VecDeque<ChangeEvent>,
    next_sequence: u64,
    sender: broadcast::Sender<ChangeEvent>,
    muted: u32,
}

impl Feed {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            documents: BTreeMap::new(),
            log: VecDeque::with_capacity(capacity),
            next_sequence: 1,
            sender,
            muted: 0,
        }
    }

    fn record(
        &mut self,
        collection: Collection,
        operation: OperationKind,
        document_id: String,
        capacity: usize,
    ) -> ResumeToken {
        let token = ResumeToken::new(self.next_sequence);
        self.next_sequence = self.next_sequence.saturating_add(1);

        if self.muted > 0 {
            self.muted -= 1;
            tracing::debug!(%collection, %token, "change notification muted");
            return token;
        }

        let event = ChangeEvent::new(collection, operation, Some(document_id), token);
        self.log.push_back(event.clone());
        while self.log.len() > capacity {
            self.log.pop_front();
        }
        let _ = self.sender.send(event);
        token
    }

    fn replay_after(
        &self,
        collection: Collection,
        token: ResumeToken,
    ) -> Result<Vec<ChangeEvent>, StatsError> {
        let missed: Vec<ChangeEvent> = self
            .log
            .iter()
            .filter(|e| e.resume_token > token)
            .cloned()
            .collect();
        let expected = self
            .next_sequence
            .saturating_sub(token.sequence().saturating_add(1));
        if u64::try_from(missed.len()).unwrap_or(u64::MAX) != expected {
            return Err(StatsError::ResumeTokenInvalid(collection));
        }
        Ok(missed)
    }
}

/// Document store with per-collection change feeds, held in memory.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    content: Mutex<Feed>,
    users: Mutex<Feed>,
    history_capacity: usize,
    failing_reads: AtomicU32,
    failing_subscriptions: AtomicU32,
    dropping_streams: AtomicU32,
}

impl MemoryDocumentStore {
    /// Creates an empty store retaining `history_capacity` events per
    /// collection for resumption.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        let capacity = history_capacity.max(1);
        Self {
            content: Mutex::new(Feed::new(capacity)),
            users: Mutex::new(Feed::new(capacity)),
            history_capacity: capacity,
            failing_reads: AtomicU32::new(0),
            failing_subscriptions: AtomicU32::new(0),
            dropping_streams: AtomicU32::new(0),
        }
    }

    const fn feed(&self, collection: Collection) -> &Mutex<Feed> {
        match collection {
            Collection::Content => &self.content,
            Collection::Users => &self.users,
        }
    }

    /// Loads documents without emitting change events.
    ///
    /// Used to stage the dataset that exists before the engine starts.
    pub async fn load<I>(&self, collection: Collection, documents: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut feed = self.feed(collection).lock().await;
        feed.documents.extend(documents);
    }

    /// Inserts or replaces a document and emits a change event.
    pub async fn insert(
        &self,
        collection: Collection,
        id: impl Into<String>,
        document: serde_json::Value,
    ) -> ResumeToken {
        let id = id.into();
        let mut feed = self.feed(collection).lock().await;
        let operation = if feed.documents.insert(id.clone(), document).is_some() {
            OperationKind::Replace
        } else {
            OperationKind::Insert
        };
        feed.record(collection, operation, id, self.history_capacity)
    }

    /// Modifies a document in place and emits a change event.
    ///
    /// Returns `None` when the document does not exist.
    pub async fn update<F>(&self, collection: Collection, id: &str, modify: F) -> Option<ResumeToken>
    where
        F: FnOnce(&mut serde_json::Value),
    {
        let mut feed = self.feed(collection).lock().await;
        modify(feed.documents.get_mut(id)?);
        Some(feed.record(
            collection,
            OperationKind::Update,
            id.to_string(),
            self.history_capacity,
        ))
    }

    /// Deletes a document and emits a change event.
    ///
    /// Returns `None` when the document does not exist.
    pub async fn delete(&self, collection: Collection, id: &str) -> Option<ResumeToken> {
        let mut feed = self.feed(collection).lock().await;
        feed.documents.remove(id)?;
        Some(feed.record(
            collection,
            OperationKind::Delete,
            id.to_string(),
            self.history_capacity,
        ))
    }

    /// Returns the number of documents in `collection`.
    pub async fn document_count(&self, collection: Collection) -> usize {
        self.feed(collection).lock().await.documents.len()
    }

    /// Closes every open subscription on `collection`.
    ///
    /// Subscribers drain what was already delivered, then see the stream end.
    pub async fn disconnect(&self, collection: Collection) {
        let mut feed = self.feed(collection).lock().await;
        let (sender, _) = broadcast::channel(self.history_capacity);
        feed.sender = sender;
        tracing::debug!(%collection, "change feed disconnected");
    }

    /// Applies the next `count` writes on `collection` without announcing
    /// them: no log entry, no live event.
    pub async fn mute_notifications(&self, collection: Collection, count: u32) {
        self.feed(collection).lock().await.muted = count;
    }

    /// Drops the replay log of `collection`.
    pub async fn forget_history(&self, collection: Collection) {
        self.feed(collection).lock().await.log.clear();
    }

    /// Makes the next `count` calls to `list_all` fail.
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `subscribe` fail.
    pub fn fail_next_subscriptions(&self, count: u32) {
        self.failing_subscriptions.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` subscriptions succeed with a stream that ends
    /// at once.
    pub fn drop_next_streams(&self, count: u32) {
        self.dropping_streams.store(count, Ordering::SeqCst);
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Decrements `counter` if positive; returns `true` when it did.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ChangeSource for MemoryDocumentStore {
    async fn subscribe(
        &self,
        collection: Collection,
        resume_after: Option<ResumeToken>,
    ) -> Result<ChangeStream, StatsError> {
        if take_failure(&self.failing_subscriptions) {
            return Err(StatsError::Transport(format!(
                "change feed for {collection} unavailable"
            )));
        }
        if take_failure(&self.dropping_streams) {
            tracing::debug!(%collection, "change feed dropped on subscribe");
            let dropped = futures_util::stream::empty::<Result<ChangeEvent, StatsError>>();
            return Ok(Box::pin(dropped));
        }

        let feed = self.feed(collection).lock().await;
        let replay = match resume_after {
            Some(token) => feed.replay_after(collection, token)?,
            None => Vec::new(),
        };
        let receiver = feed.sender.subscribe();
        drop(feed);

        tracing::debug!(%collection, replayed = replay.len(), "change feed subscribed");

        let live = futures_util::stream::unfold(receiver, move |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%collection, skipped, "change subscriber lagged behind");
                    Some((Err(StatsError::ResumeTokenInvalid(collection)), receiver))
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });

        Ok(Box::pin(
            futures_util::stream::iter(replay.into_iter().map(Ok)).chain(live),
        ))
    }
}

#[async_trait]
impl SourceCollections for MemoryDocumentStore {
    async fn list_all(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StatsError> {
        if take_failure(&self.failing_reads) {
            return Err(StatsError::Source(format!("read of {collection} failed")));
        }
        let feed = self.feed(collection).lock().await;
        Ok(feed.documents.values().cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn next_event(stream: &mut ChangeStream) -> Result<ChangeEvent, StatsError> {
        match tokio::time::timeout(Duration::from_secs(1), stream.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => Err(StatsError::Transport("stream ended".to_string())),
            Err(_) => Err(StatsError::Transport("timed out".to_string())),
        }
    }

    #[tokio::test]
    async fn load_does_not_emit_events() {
        let store = MemoryDocumentStore::default();
        let Ok(mut stream) = store.subscribe(Collection::Content, None).await else {
            panic!("subscribe failed");
        };
        store
            .load(Collection::Content, [("c1".to_string(), json!({"views": 3}))])
            .await;
        store.insert(Collection::Content, "c2", json!({"views": 1})).await;

        let Ok(event) = next_event(&mut stream).await else {
            panic!("expected event");
        };
        assert_eq!(event.document_id.as_deref(), Some("c2"));
        assert_eq!(store.document_count(Collection::Content).await, 2);
    }

    #[tokio::test]
    async fn live_events_arrive_in_order() {
        let store = MemoryDocumentStore::default();
        let Ok(mut stream) = store.subscribe(Collection::Users, None).await else {
            panic!("subscribe failed");
        };
        store.insert(Collection::Users, "u1", json!({})).await;
        store
            .update(Collection::Users, "u1", |doc| {
                doc["subscription"] = json!({"status": "active"});
            })
            .await;
        store.delete(Collection::Users, "u1").await;

        let mut ops = Vec::new();
        for _ in 0..3 {
            let Ok(event) = next_event(&mut stream).await else {
                panic!("expected event");
            };
            ops.push(event.operation);
        }
        assert_eq!(
            ops,
            vec![OperationKind::Insert, OperationKind::Update, OperationKind::Delete]
        );
    }

    #[tokio::test]
    async fn resume_replays_missed_events() {
        let store = MemoryDocumentStore::default();
        let first = store.insert(Collection::Content, "c1", json!({"views": 0})).await;
        store.insert(Collection::Content, "c2", json!({"views": 0})).await;
        store.insert(Collection::Content, "c3", json!({"views": 0})).await;

        let Ok(mut stream) = store.subscribe(Collection::Content, Some(first)).await else {
            panic!("resume should succeed");
        };
        let Ok(a) = next_event(&mut stream).await else {
            panic!("expected replay");
        };
        let Ok(b) = next_event(&mut stream).await else {
            panic!("expected replay");
        };
        assert_eq!(a.document_id.as_deref(), Some("c2"));
        assert_eq!(b.document_id.as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn muted_write_invalidates_resume() {
        let store = MemoryDocumentStore::default();
        let token = store.insert(Collection::Content, "c1", json!({"views": 0})).await;
        store.mute_notifications(Collection::Content, 1).await;
        store
            .update(Collection::Content, "c1", |doc| doc["views"] = json!(5))
            .await;

        let result = store.subscribe(Collection::Content, Some(token)).await;
        assert!(matches!(result, Err(StatsError::ResumeTokenInvalid(Collection::Content))));
    }

    #[tokio::test]
    async fn forgotten_history_invalidates_resume() {
        let store = MemoryDocumentStore::default();
        let token = store.insert(Collection::Users, "u1", json!({})).await;
        store.insert(Collection::Users, "u2", json!({})).await;
        store.forget_history(Collection::Users).await;

        let result = store.subscribe(Collection::Users, Some(token)).await;
        assert!(matches!(result, Err(StatsError::ResumeTokenInvalid(_))));

        let caught_up = store.subscribe(Collection::Users, Some(ResumeToken::new(2))).await;
        assert!(caught_up.is_ok());
    }

    #[tokio::test]
    async fn disconnect_ends_stream() {
        let store = MemoryDocumentStore::default();
        let Ok(mut stream) = store.subscribe(Collection::Content, None).await else {
            panic!("subscribe failed");
        };
        store.disconnect(Collection::Content).await;
        let ended = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert!(matches!(ended, Ok(None)));
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_resume_error() {
        let store = MemoryDocumentStore::new(2);
        let Ok(mut stream) = store.subscribe(Collection::Content, None).await else {
            panic!("subscribe failed");
        };
        for i in 0..5 {
            store.insert(Collection::Content, format!("c{i}"), json!({})).await;
        }
        let result = next_event(&mut stream).await;
        assert!(matches!(result, Err(StatsError::ResumeTokenInvalid(_))));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryDocumentStore::default();
        store.fail_next_reads(1);
        assert!(store.list_all(Collection::Users).await.is_err());
        assert!(store.list_all(Collection::Users).await.is_ok());

        store.fail_next_subscriptions(1);
        assert!(store.subscribe(Collection::Users, None).await.is_err());
        assert!(store.subscribe(Collection::Users, None).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_stream_ends_immediately() {
        let store = MemoryDocumentStore::default();
        store.drop_next_streams(1);
        let Ok(mut dropped) = store.subscribe(Collection::Content, None).await else {
            panic!("subscribe failed");
        };
        assert!(dropped.next().await.is_none());

        let Ok(mut live) = store.subscribe(Collection::Content, None).await else {
            panic!("subscribe failed");
        };
        store.insert(Collection::Content, "c1", json!({})).await;
        assert!(next_event(&mut live).await.is_ok());
    }
}
