//! Shared harness: an in-memory engine served over a real TCP socket.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use stats_engine::api;
use stats_engine::app_state::AppState;
use stats_engine::domain::{Collection, EventBus, ListenerState};
use stats_engine::persistence::{MemorySnapshotStore, SnapshotStore};
use stats_engine::service::{
    HealthRegistry, ListenerSupervisor, RecomputeEngine, StatsService, SupervisorConfig,
    SupervisorHandle,
};
use stats_engine::source::{ChangeSource, MemoryDocumentStore, SourceCollections};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestApp {
    pub addr: SocketAddr,
    pub docs: Arc<MemoryDocumentStore>,
    pub store: Arc<MemorySnapshotStore>,
    pub listeners: SupervisorHandle,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// GETs `path` until `check` accepts the JSON body.
    pub async fn poll_json<F>(&self, path: &str, check: F) -> serde_json::Value
    where
        F: Fn(&serde_json::Value) -> bool,
    {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Ok(response) = client.get(self.url(path)).send().await
                && let Ok(body) = response.json::<serde_json::Value>().await
                && check(&body)
            {
                return body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("GET {path} never matched");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Three courses with 15 views in total and 40 users, 3 of them subscribed.
pub async fn seed_documents(docs: &MemoryDocumentStore) {
    docs.load(
        Collection::Content,
        [
            ("c1".to_string(), json!({"title": "Rust", "views": 10})),
            ("c2".to_string(), json!({"title": "Tokio", "views": 5})),
            ("c3".to_string(), json!({"title": "Axum", "views": 0})),
        ],
    )
    .await;
    docs.load(
        Collection::Users,
        (0..40).map(|i| {
            let doc = if i < 3 {
                json!({"email": format!("u{i}@example.com"), "subscription": {"id": format!("sub_{i}"), "status": "active"}})
            } else {
                json!({"email": format!("u{i}@example.com")})
            };
            (format!("u{i}"), doc)
        }),
    )
    .await;
}

pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
        max_consecutive_failures: 3,
        rollover_interval: None,
    }
}

/// Starts engine, listeners and HTTP server; returns once both listeners
/// are subscribed and have resynced.
pub async fn spawn_app() -> TestApp {
    let docs = Arc::new(MemoryDocumentStore::default());
    seed_documents(&docs).await;
    let store = Arc::new(MemorySnapshotStore::new());
    let event_bus = EventBus::new(1024);

    let engine = Arc::new(RecomputeEngine::new(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        Arc::clone(&docs) as Arc<dyn SourceCollections>,
        event_bus.clone(),
        5,
    ));
    let supervisor = ListenerSupervisor::new(
        engine,
        Arc::clone(&docs) as Arc<dyn ChangeSource>,
        fast_config(),
    );
    let Ok(listeners) = supervisor.start().await else {
        panic!("supervisor failed to start");
    };
    wait_until_subscribed(listeners.health()).await;

    let state = AppState {
        stats_service: StatsService::new(Arc::clone(&store) as Arc<dyn SnapshotStore>),
        event_bus,
        health: listeners.health().clone(),
    };
    let addr = serve(state).await;

    TestApp {
        addr,
        docs,
        store,
        listeners,
    }
}

/// Serves the application on an ephemeral port.
pub async fn serve(state: AppState) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local address");
    };
    let app = api::build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

pub async fn wait_until_subscribed(health: &HealthRegistry) {
    for collection in Collection::ALL {
        let mut rx = health.subscribe(collection);
        let waited = tokio::time::timeout(
            WAIT,
            rx.wait_for(|h| h.state == ListenerState::Subscribed && h.recomputations > 0),
        )
        .await;
        let Ok(Ok(_)) = waited else {
            panic!("listener {collection} never subscribed");
        };
    }
}
