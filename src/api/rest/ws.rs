use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;
use uuid::Uuid;

use crate::realtime::coordinator::Coordinator;
use crate::realtime::events::{ClientEvent, ServerEvent};

/// The actor id arrives pre-authenticated from the fronting identity layer;
/// this handler only resolves it against the store.
#[derive(Deserialize)]
pub struct ConnectParams {
    pub actor_id: Uuid,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator, params.actor_id))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>, actor_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let session = match coordinator.connect(actor_id, tx) {
        Ok(session) => session,
        Err(err) => {
            let event = ServerEvent::Error {
                kind: err.kind().to_string(),
                message: err.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&event) {
                let _ = sender.send(Message::Text(json)).await;
            }
            return;
        }
    };

    let mut outbound = UnboundedReceiverStream::new(rx);
    let send_task = tokio::spawn(async move {
        while let Some(event) = outbound.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize server event");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_coordinator = coordinator.clone();
    let recv_session = session.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => recv_coordinator.handle(&recv_session, event),
                Err(err) => {
                    let _ = recv_session.outbox.send(ServerEvent::Error {
                        kind: "bad_request".to_string(),
                        message: format!("malformed event: {err}"),
                    });
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    coordinator.disconnect(&session);
}
