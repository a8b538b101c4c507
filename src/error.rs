//! Engine error types with HTTP status code mapping.
//!
//! [`StatsError`] is the central error type for the statistics engine. The
//! listener tasks use it to classify failures (transport, data, conflict);
//! the read API maps each variant to an HTTP status code and a structured
//! JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Collection;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "no current statistics snapshot"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Engine error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request           |
/// | 2000–2999 | State / Not Found | 404 Not Found / 409       |
/// | 3000–3999 | Server            | 500 Internal Server Error |
/// | 5000–5999 | Upstream source   | 503 Service Unavailable   |
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// No current snapshot exists; seeding never happened or failed.
    #[error("no current statistics snapshot")]
    SnapshotMissing,

    /// The compare-and-swap on the current snapshot kept losing.
    #[error("snapshot update conflicted {attempts} times in a row")]
    Conflict {
        /// Number of read-compute-write cycles attempted.
        attempts: u32,
    },

    /// Reading a source collection failed.
    #[error("source read failed: {0}")]
    Source(String),

    /// The change subscription dropped or could not be established.
    #[error("change stream transport error: {0}")]
    Transport(String),

    /// The change source cannot resume from the requested position;
    /// events were missed and the collection needs a full recomputation.
    #[error("resume position no longer available for {0}")]
    ResumeTokenInvalid(Collection),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StatsError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::SnapshotMissing => 2001,
            Self::Conflict { .. } => 2002,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::Source(_) => 5001,
            Self::Transport(_) => 5002,
            Self::ResumeTokenInvalid(_) => 5003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SnapshotMissing => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Source(_) | Self::Transport(_) | Self::ResumeTokenInvalid(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Returns `true` for failures of the subscription itself, which the
    /// supervisor recovers from by resubscribing.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ResumeTokenInvalid(_))
    }
}

impl From<sqlx::Error> for StatsError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
