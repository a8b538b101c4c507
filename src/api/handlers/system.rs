//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::{Collection, ListenerState};

/// State of one listener as reported by the health check.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListenerStatus {
    collection: Collection,
    state: ListenerState,
    fatal: bool,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    listeners: Vec<ListenerStatus>,
}

/// `GET /health` — Service health status.
///
/// Reports `degraded` while any listener is not subscribed or has been
/// flagged fatal.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, listener states and current timestamp.",
    responses(
        (status = 200, description = "Service health", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let listeners: Vec<ListenerStatus> = state
        .health
        .all()
        .into_iter()
        .map(|h| ListenerStatus {
            collection: h.collection,
            state: h.state,
            fatal: h.fatal,
        })
        .collect();
    let status = if state.health.is_healthy() {
        "healthy"
    } else {
        "degraded"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            listeners,
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
