//! Dashboard WebSocket
//!
//! Each socket gets a hub connection. A writer task drains the connection's queue
//! into the socket while the reader applies subscribe/unsubscribe requests. The
//! connection is unregistered as soon as the client goes away.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::broadcast::hub::{Connection, ConnectionId, Hub};
use crate::broadcast::protocol::ClientMessage;
use crate::server::state::ServerState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (connection, mut outbox) = Connection::new();
    let id = connection.id();
    state.hub.register(connection);
    info!(connection = %id, "Dashboard client connected");

    if let Err(e) = state.store.send_state(id, state.history_limit).await {
        warn!(connection = %id, error = %e, "Failed to send initial state");
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => apply_client_message(&state.hub, id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    // Dropping the hub entry closes the outbox, which ends the writer
    state.hub.unregister(&id);
    let _ = writer.await;
    info!(connection = %id, "Dashboard client disconnected");
}

fn apply_client_message(hub: &Hub, id: ConnectionId, text: &str) {
    match ClientMessage::decode(text) {
        Some(ClientMessage::Subscribe { topic }) => {
            hub.subscribe(&id, &topic);
        }
        Some(ClientMessage::Unsubscribe { topic }) => {
            hub.unsubscribe(&id, &topic);
        }
        None => {}
    }
}
