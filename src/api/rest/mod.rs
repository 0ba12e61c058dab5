pub mod actors;
pub mod rides;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::realtime::coordinator::Coordinator;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .merge(actors::router())
        .merge(rides::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(coordinator)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    actors: usize,
    rides: usize,
    breadcrumbs: usize,
}

async fn health(State(coordinator): State<Arc<Coordinator>>) -> Json<HealthResponse> {
    let state = &coordinator.state;
    Json(HealthResponse {
        status: "ok",
        actors: state.actors.len(),
        rides: state.rides.len(),
        breadcrumbs: state.breadcrumbs.len(),
    })
}

async fn metrics(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    match coordinator.state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
