//! Shared application state injected into all Axum handlers.

use crate::domain::EventBus;
use crate::service::{HealthRegistry, StatsService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read access to the statistics snapshots.
    pub stats_service: StatsService,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Listener health records.
    pub health: HealthRegistry,
}
