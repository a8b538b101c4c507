//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` pushes engine events to clients that
//! subscribed to their topic and answers snapshot queries.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
