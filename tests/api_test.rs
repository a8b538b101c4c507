//! REST surface tests against a live in-memory engine.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio_test::assert_ok;
use tower::ServiceExt;

use stats_engine::api;
use stats_engine::app_state::AppState;
use stats_engine::domain::{Collection, EventBus};
use stats_engine::persistence::{MemorySnapshotStore, SnapshotStore};
use stats_engine::service::{HealthRegistry, StatsService};

use common::spawn_app;

async fn get_json(url: &str) -> (reqwest::StatusCode, Value) {
    let response = assert_ok!(reqwest::get(url).await);
    let status = response.status();
    let body = assert_ok!(response.json::<Value>().await);
    (status, body)
}

#[tokio::test]
async fn current_stats_after_seeding() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app.url("/api/v1/stats")).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["views"], 15);
    assert_eq!(body["subscriptions"], 3);
    assert_eq!(body["users"], 40);
    assert!(body["snapshot_id"].is_string());
}

#[tokio::test]
async fn stats_follow_source_changes() {
    let app = spawn_app().await;

    app.docs
        .update(Collection::Content, "c2", |doc| doc["views"] = json!(6))
        .await;
    let body = app
        .poll_json("/api/v1/stats", |b| b["views"] == 16)
        .await;
    assert_eq!(body["users"], 40);

    app.docs
        .insert(Collection::Users, "u40", json!({"email": "new@example.com"}))
        .await;
    let body = app
        .poll_json("/api/v1/stats", |b| b["users"] == 41)
        .await;
    assert_eq!(body["subscriptions"], 3);
    assert_eq!(body["views"], 16);

    app.docs
        .update(Collection::Users, "u0", |doc| {
            doc["subscription"]["status"] = json!("cancelled");
        })
        .await;
    app.docs.delete(Collection::Content, "c1").await;
    let body = app
        .poll_json("/api/v1/stats", |b| b["subscriptions"] == 2 && b["views"] == 6)
        .await;
    assert_eq!(body["users"], 41);

    app.listeners.stop().await;
}

#[tokio::test]
async fn history_limit_is_validated() {
    let app = spawn_app().await;

    let (status, body) = get_json(&app.url("/api/v1/stats/history?limit=0")).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1001);

    let (status, body) = get_json(&app.url("/api/v1/stats/history?limit=101")).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());

    let (status, body) = get_json(&app.url("/api/v1/stats/history")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn dashboard_is_padded_to_twelve() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app.url("/api/v1/stats/dashboard")).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    let Some(stats) = body["stats"].as_array() else {
        panic!("stats is not an array");
    };
    assert_eq!(stats.len(), 12);
    assert!(stats.iter().take(11).all(|p| p["views"] == 0));
    assert_eq!(body["views"]["current"], 15);
    assert_eq!(body["views"]["profit"], true);
    assert_eq!(body["users"]["percentage"], 4000.0);
}

#[tokio::test]
async fn listeners_and_health_report_subscribed() {
    let app = spawn_app().await;

    let (status, body) = get_json(&app.url("/api/v1/stats/listeners")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let Some(listeners) = body["listeners"].as_array() else {
        panic!("listeners is not an array");
    };
    assert_eq!(listeners.len(), 2);
    assert!(listeners.iter().all(|l| l["state"] == "subscribed"));

    let (status, body) = get_json(&app.url("/health")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let health_url = app.url("/health");
    app.listeners.stop().await;
    let (_, body) = get_json(&health_url).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn openapi_document_lists_endpoints() {
    let app = spawn_app().await;
    let (status, body) = get_json(&app.url("/openapi.json")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(body["paths"]["/api/v1/stats"].is_object());
    assert!(body["paths"]["/api/v1/stats/dashboard"].is_object());
    assert!(body["paths"]["/health"].is_object());
}

#[tokio::test]
async fn unseeded_store_maps_to_not_found() {
    let store = Arc::new(MemorySnapshotStore::new());
    let state = AppState {
        stats_service: StatsService::new(store as Arc<dyn SnapshotStore>),
        event_bus: EventBus::new(16),
        health: HealthRegistry::new(),
    };
    let app = api::build_app(state);

    let request = assert_ok!(Request::builder().uri("/api/v1/stats").body(Body::empty()));
    let response = assert_ok!(app.clone().oneshot(request).await);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let request = assert_ok!(Request::builder().uri("/health").body(Body::empty()));
    let response = assert_ok!(app.oneshot(request).await);
    assert_eq!(response.status(), StatusCode::OK);
}
