use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::ride::RideStatus;

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("no available drivers")]
    NoAvailableDrivers,

    #[error("route planning failed: {0}")]
    RoutePlanningFailed(String),

    #[error("already rated by this role")]
    AlreadyRated,

    #[error("ride is not yet completed")]
    NotYetCompleted,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable machine-readable kind, shared by the HTTP and realtime layers.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotFound(_) => "not_found",
            DispatchError::InvalidTransition { .. } => "invalid_transition",
            DispatchError::NotAuthorized(_) => "not_authorized",
            DispatchError::NoAvailableDrivers => "no_available_drivers",
            DispatchError::RoutePlanningFailed(_) => "route_planning_failed",
            DispatchError::AlreadyRated => "already_rated",
            DispatchError::NotYetCompleted => "not_yet_completed",
            DispatchError::BadRequest(_) => "bad_request",
            DispatchError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::InvalidTransition { .. } => StatusCode::CONFLICT,
            DispatchError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            DispatchError::NoAvailableDrivers => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::RoutePlanningFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::AlreadyRated => StatusCode::CONFLICT,
            DispatchError::NotYetCompleted => StatusCode::CONFLICT,
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));

        (self.status_code(), body).into_response()
    }
}
