mod api;
mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod planner;
mod realtime;
mod state;
mod tracker;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::realtime::coordinator::Coordinator;

#[tokio::main]
async fn main() -> Result<(), error::DispatchError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let http_port = config.http_port;
    let app_state = Arc::new(state::AppState::new(config));
    let coordinator = Arc::new(Coordinator::new(app_state.clone()));

    tokio::spawn(tracker::run_breadcrumb_janitor(app_state.clone()));

    let app = api::rest::router(coordinator);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::DispatchError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "dispatch server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::DispatchError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
