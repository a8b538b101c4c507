//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType, WsRequest};
use super::subscription::SubscriptionManager;
use crate::api::dto::SnapshotDto;
use crate::domain::{EventTopic, StatsEvent};
use crate::service::StatsService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<StatsEvent>,
    stats_service: StatsService,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &stats_service).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(stats_event) => {
                        if subs.matches(stats_event.topic()) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&stats_event).unwrap_or_default(),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Splits topic names into known topics, the wildcard flag and rejects.
fn parse_topics(names: &[String]) -> (Vec<EventTopic>, bool, Vec<String>) {
    let mut topics = Vec::new();
    let mut wildcard = false;
    let mut rejected = Vec::new();
    for name in names {
        if name == "*" {
            wildcard = true;
        } else if let Some(topic) = EventTopic::parse(name) {
            topics.push(topic);
        } else {
            rejected.push(name.clone());
        }
    }
    (topics, wildcard, rejected)
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    stats_service: &StatsService,
) -> Option<String> {
    let request = match serde_json::from_str::<WsRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unreadable ws command");
            return serde_json::to_string(&WsMessage::error("", 400, "malformed or unknown command"))
                .ok();
        }
    };

    let response = match request.command {
        WsCommand::Subscribe { topics } => {
            let (topics, wildcard, rejected) = parse_topics(&topics);
            subs.subscribe(&topics, wildcard);
            WsMessage::new(
                request.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": topics,
                    "rejected": rejected,
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::Unsubscribe { topics } => {
            let (topics, wildcard, rejected) = parse_topics(&topics);
            subs.unsubscribe(&topics, wildcard);
            WsMessage::new(
                request.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": topics,
                    "rejected": rejected,
                    "remaining_count": subs.count(),
                }),
            )
        }
        WsCommand::GetSnapshot => match stats_service.current().await {
            Ok(snapshot) => WsMessage::new(
                request.id,
                WsMessageType::Response,
                serde_json::to_value(SnapshotDto::from(snapshot)).unwrap_or_default(),
            ),
            Err(e) => WsMessage::error(request.id, e.status_code().as_u16(), e.to_string()),
        },
    };

    serde_json::to_string(&response).ok()
}
