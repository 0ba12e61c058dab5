use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::ride::Ride;
use crate::realtime::coordinator::Coordinator;

pub fn router() -> Router<Arc<Coordinator>> {
    Router::new().route("/rides/:id", get(get_ride))
}

/// Read-back for receipts and support tooling. All mutation goes through the
/// dispatch operations.
async fn get_ride(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, DispatchError> {
    let ride = coordinator
        .state
        .rides
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("ride {id} not found")))?;

    Ok(Json(ride.value().clone()))
}
