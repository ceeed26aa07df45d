//! Events WebSocket handler
//!
//! Forwards every event published on the bus to the client as JSON.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use deckhand_core::EventBus;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::server::AppState;

mod types;

pub use types::{ClientMessage, SessionMessage};

/// WebSocket upgrade handler
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let event_bus = state.event_bus.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, event_bus))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, event_bus: Arc<EventBus>) {
    let session_id = Uuid::new_v4();
    info!("WebSocket events connection established: {}", session_id);

    // Subscribe before greeting so nothing published after the greeting is missed
    let mut event_rx = event_bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let connected_msg = SessionMessage::Connected { session_id };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = sender.send(Message::Text(json)).await;
    }

    loop {
        tokio::select! {
            // Client messages
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, session_id) {
                            if let Ok(json) = serde_json::to_string(&reply) {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket events connection closed: {}", session_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            // EventBus events
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(session_id = %session_id, lagged = n, "Event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    info!("WebSocket events connection ended: {}", session_id);
}

/// Reply to a client message, if it needs one
fn handle_client_message(text: &str, session_id: Uuid) -> Option<SessionMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Connected) => {
            debug!(session_id = %session_id, "Client reported connected");
            None
        }
        Ok(ClientMessage::Ping) => Some(SessionMessage::Pong),
        Err(e) => Some(SessionMessage::Error {
            message: format!("Invalid message format: {}", e),
            code: Some("INVALID_MESSAGE".to_string()),
        }),
    }
}
