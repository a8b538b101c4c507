//! WebSocket push tests: topic subscriptions and snapshot queries.

#![allow(clippy::panic)]

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use stats_engine::domain::Collection;

use common::{WAIT, spawn_app};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(url: &str) -> Socket {
    let Ok((socket, _)) = tokio_tungstenite::connect_async(url).await else {
        panic!("websocket handshake failed");
    };
    socket
}

async fn send(socket: &mut Socket, command: Value) {
    let sent = socket.send(Message::text(command.to_string())).await;
    assert!(sent.is_ok(), "send failed");
}

/// Reads frames until one matches `check`.
async fn next_matching<F>(socket: &mut Socket, check: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let Ok(Some(Ok(frame))) = tokio::time::timeout(remaining, socket.next()).await else {
            panic!("no matching frame before timeout");
        };
        let Ok(text) = frame.to_text() else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            continue;
        };
        if check(&value) {
            return value;
        }
    }
}

#[tokio::test]
async fn snapshot_updates_are_pushed_to_subscribers() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;

    send(
        &mut socket,
        json!({"id": "sub-1", "command": "subscribe", "topics": ["snapshot"]}),
    )
    .await;
    let ack = next_matching(&mut socket, |v| v["id"] == "sub-1").await;
    assert_eq!(ack["type"], "response");
    assert_eq!(ack["payload"]["subscribed"][0], "snapshot");

    app.docs
        .update(Collection::Content, "c2", |doc| doc["views"] = json!(6))
        .await;

    let event = next_matching(&mut socket, |v| {
        v["type"] == "event" && v["payload"]["event_type"] == "snapshot_updated"
    })
    .await;
    assert_eq!(event["payload"]["views"], 16);
    assert_eq!(event["payload"]["collection"], "content");
}

#[tokio::test]
async fn listener_topic_reports_state_changes() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;

    send(
        &mut socket,
        json!({"id": "sub-2", "command": "subscribe", "topics": ["*"]}),
    )
    .await;
    let ack = next_matching(&mut socket, |v| v["id"] == "sub-2").await;
    assert_eq!(ack["payload"]["wildcard"], true);

    app.docs.disconnect(Collection::Users).await;

    let event = next_matching(&mut socket, |v| {
        v["payload"]["event_type"] == "listener_state_changed"
            && v["payload"]["collection"] == "users"
            && v["payload"]["state"] == "subscribed"
    })
    .await;
    assert_eq!(event["type"], "event");
}

#[tokio::test]
async fn get_snapshot_returns_current_figures() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;

    send(&mut socket, json!({"id": "q", "command": "get_snapshot"})).await;
    let reply = next_matching(&mut socket, |v| v["id"] == "q").await;

    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"]["views"], 15);
    assert_eq!(reply["payload"]["subscriptions"], 3);
    assert_eq!(reply["payload"]["users"], 40);
}

#[tokio::test]
async fn unknown_command_gets_an_error() {
    let app = spawn_app().await;
    let mut socket = connect(&app.ws_url()).await;

    send(&mut socket, json!({"command": "swap"})).await;
    let reply = next_matching(&mut socket, |v| v["type"] == "error").await;
    assert_eq!(reply["payload"]["code"], 400);
}
