//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Statistics endpoints are mounted under `/api/v1`; `/health` and
//! `/openapi.json` sit at the root.

pub mod dto;
pub mod handlers;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI description of the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(
        handlers::system::health_handler,
        handlers::stats::get_current,
        handlers::stats::get_history,
        handlers::stats::get_dashboard,
        handlers::stats::get_listeners,
    ),
    components(schemas(
        dto::SnapshotDto,
        dto::HistoryResponse,
        dto::ListenersResponse,
        handlers::system::HealthResponse,
        handlers::system::ListenerStatus,
        crate::service::DashboardStats,
        crate::service::DashboardPoint,
        crate::service::MetricTrend,
        crate::service::ListenerHealth,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Statistics", description = "Platform statistics snapshots"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

/// Builds the full application: REST routes, `/ws`, Swagger UI (with the
/// `swagger-ui` feature) and the HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
