//! Statistics read handlers: current snapshot, history, dashboard, listeners.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{HistoryParams, HistoryResponse, ListenersResponse, SnapshotDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, StatsError};
use crate::service::DashboardStats;

/// `GET /stats` — Current statistics snapshot.
///
/// # Errors
///
/// Returns [`StatsError::SnapshotMissing`] before the first seed.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "Statistics",
    summary = "Current statistics",
    description = "Returns the current snapshot: total views, active subscriptions and registered users.",
    responses(
        (status = 200, description = "Current snapshot", body = SnapshotDto),
        (status = 404, description = "Statistics not seeded yet", body = ErrorResponse),
    )
)]
pub async fn get_current(State(state): State<AppState>) -> Result<impl IntoResponse, StatsError> {
    let snapshot = state.stats_service.current().await?;
    Ok(Json(SnapshotDto::from(snapshot)))
}

/// `GET /stats/history` — Most recent snapshots.
///
/// # Errors
///
/// Returns [`StatsError::InvalidRequest`] for a limit outside 1-100.
#[utoipa::path(
    get,
    path = "/api/v1/stats/history",
    tag = "Statistics",
    summary = "Snapshot history",
    description = "Returns the most recent snapshots, newest first.",
    params(HistoryParams),
    responses(
        (status = 200, description = "Snapshot history", body = HistoryResponse),
        (status = 400, description = "Invalid limit", body = ErrorResponse),
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, StatsError> {
    let snapshots = state.stats_service.history(params.limit()).await?;
    Ok(Json(HistoryResponse::from(snapshots)))
}

/// `GET /stats/dashboard` — Admin dashboard figures.
///
/// # Errors
///
/// Returns [`StatsError::PersistenceError`] if the history cannot be read.
#[utoipa::path(
    get,
    path = "/api/v1/stats/dashboard",
    tag = "Statistics",
    summary = "Admin dashboard",
    description = "Returns the last 12 snapshots (oldest first, zero padded) and the percentage change of each metric between the last two.",
    responses(
        (status = 200, description = "Dashboard figures", body = DashboardStats),
    )
)]
pub async fn get_dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, StatsError> {
    let dashboard = state.stats_service.dashboard().await?;
    Ok(Json(dashboard))
}

/// `GET /stats/listeners` — Change listener health.
#[utoipa::path(
    get,
    path = "/api/v1/stats/listeners",
    tag = "Statistics",
    summary = "Listener health",
    description = "Returns connection state, counters and last error of each change listener.",
    responses(
        (status = 200, description = "Listener health", body = ListenersResponse),
    )
)]
pub async fn get_listeners(State(state): State<AppState>) -> impl IntoResponse {
    Json(ListenersResponse {
        listeners: state.health.all(),
    })
}

/// Statistics routes, mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_current))
        .route("/stats/history", get(get_history))
        .route("/stats/dashboard", get(get_dashboard))
        .route("/stats/listeners", get(get_listeners))
}
