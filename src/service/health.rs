//! Per-listener health records.
//!
//! Each collection listener owns a [`ListenerHealth`] record published
//! through a [`tokio::sync::watch`] channel. The read API reports it, and
//! tests wait on it to observe state transitions deterministically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::domain::{Collection, ListenerState};

/// Operational view of one collection listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ListenerHealth {
    /// Listener's collection.
    pub collection: Collection,
    /// Current connection state.
    pub state: ListenerState,
    /// Change events received and handled.
    pub events_handled: u64,
    /// Successful recomputations, including full resyncs.
    pub recomputations: u64,
    /// Failed recomputations.
    pub failed_recomputations: u64,
    /// Subscriptions established after the first one.
    pub resubscriptions: u64,
    /// Failures in a row since the subscription was last established.
    pub consecutive_failures: u32,
    /// Set once `consecutive_failures` reached the configured threshold;
    /// cleared once an established subscription recomputes successfully.
    pub fatal: bool,
    /// Description of the last failure.
    pub last_error: Option<String>,
    /// Time the last change event arrived.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Time of the last successful recomputation.
    pub last_recompute_at: Option<DateTime<Utc>>,
}

impl ListenerHealth {
    /// Fresh record for a listener that has not started yet.
    #[must_use]
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            state: ListenerState::Disconnected,
            events_handled: 0,
            recomputations: 0,
            failed_recomputations: 0,
            resubscriptions: 0,
            consecutive_failures: 0,
            fatal: false,
            last_error: None,
            last_event_at: None,
            last_recompute_at: None,
        }
    }

    /// Subscribed and below the failure threshold.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == ListenerState::Subscribed && !self.fatal
    }
}

/// Health records of both listeners.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    content: Arc<watch::Sender<ListenerHealth>>,
    users: Arc<watch::Sender<ListenerHealth>>,
}

impl HealthRegistry {
    /// Creates records in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        let (content, _) = watch::channel(ListenerHealth::new(Collection::Content));
        let (users, _) = watch::channel(ListenerHealth::new(Collection::Users));
        Self {
            content: Arc::new(content),
            users: Arc::new(users),
        }
    }

    fn sender(&self, collection: Collection) -> &watch::Sender<ListenerHealth> {
        match collection {
            Collection::Content => &self.content,
            Collection::Users => &self.users,
        }
    }

    /// Returns a copy of the listener's current record.
    #[must_use]
    pub fn get(&self, collection: Collection) -> ListenerHealth {
        self.sender(collection).borrow().clone()
    }

    /// Returns copies of every record, in [`Collection::ALL`] order.
    #[must_use]
    pub fn all(&self) -> Vec<ListenerHealth> {
        Collection::ALL.iter().map(|c| self.get(*c)).collect()
    }

    /// Watches the listener's record.
    #[must_use]
    pub fn subscribe(&self, collection: Collection) -> watch::Receiver<ListenerHealth> {
        self.sender(collection).subscribe()
    }

    /// Modifies the listener's record and notifies watchers.
    pub fn update<F>(&self, collection: Collection, modify: F)
    where
        F: FnOnce(&mut ListenerHealth),
    {
        self.sender(collection).send_modify(modify);
    }

    /// `true` when every listener is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        Collection::ALL.iter().all(|c| self.get(*c).is_healthy())
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_and_unhealthy() {
        let registry = HealthRegistry::new();
        let health = registry.get(Collection::Content);
        assert_eq!(health.state, ListenerState::Disconnected);
        assert!(!registry.is_healthy());
    }

    #[test]
    fn healthy_once_both_subscribed() {
        let registry = HealthRegistry::new();
        for collection in Collection::ALL {
            registry.update(collection, |h| h.state = ListenerState::Subscribed);
        }
        assert!(registry.is_healthy());

        registry.update(Collection::Users, |h| h.fatal = true);
        assert!(!registry.is_healthy());
    }

    #[tokio::test]
    async fn watchers_see_updates() {
        let registry = HealthRegistry::new();
        let mut rx = registry.subscribe(Collection::Users);
        registry.update(Collection::Users, |h| h.events_handled = 3);
        let seen = rx.wait_for(|h| h.events_handled == 3).await;
        assert!(seen.is_ok());
    }

    #[test]
    fn all_lists_both_collections() {
        let registry = HealthRegistry::new();
        let collections: Vec<Collection> = registry.all().iter().map(|h| h.collection).collect();
        assert_eq!(collections, vec![Collection::Content, Collection::Users]);
    }
}
