use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::actor::{Actor, Role};
use crate::realtime::coordinator::Coordinator;

pub fn router() -> Router<Arc<Coordinator>> {
    Router::new()
        .route("/actors", post(create_actor))
        .route("/actors/:id", get(get_actor))
}

#[derive(Deserialize)]
pub struct CreateActorRequest {
    pub name: String,
    pub role: Role,
}

async fn create_actor(
    State(coordinator): State<Arc<Coordinator>>,
    Json(payload): Json<CreateActorRequest>,
) -> Result<Json<Actor>, DispatchError> {
    if payload.name.trim().is_empty() {
        return Err(DispatchError::BadRequest("name cannot be empty".to_string()));
    }

    let actor = Actor::new(payload.name, payload.role);
    coordinator.state.actors.insert(actor.id, actor.clone());
    Ok(Json(actor))
}

async fn get_actor(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Actor>, DispatchError> {
    let actor = coordinator
        .state
        .actors
        .get(&id)
        .ok_or_else(|| DispatchError::NotFound(format!("actor {id} not found")))?;

    Ok(Json(actor.value().clone()))
}
