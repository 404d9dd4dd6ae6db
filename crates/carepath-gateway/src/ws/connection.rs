//! `GET /ws/{session_id}` — the push channel upgrade path (§4.8, §6).
//!
//! Server → client frames are JSON-encoded `PushEnvelope`s
//! (`final_response`, `typing`, `status`, `error`). Client → server frames
//! are accepted and ignored in this revision.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use carepath_core::SessionId;
use futures_util::{SinkExt, StreamExt};
use tracing::info;

use crate::app::AppState;

const PUSH_CHANNEL_BUFFER: usize = 32;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match SessionId::parse(&session_id) {
        Ok(id) => id,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid session id").into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id))
        .into_response()
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, session_id: SessionId) {
    info!(session_id = %session_id, "push channel connected");
    let (mut tx, mut rx) = socket.split();
    let (mut envelopes, connection_handle) = state.push_hub.attach(session_id, PUSH_CHANNEL_BUFFER);

    loop {
        tokio::select! {
            envelope = envelopes.recv() => {
                match envelope {
                    Some(envelope) => {
                        let json = serde_json::to_string(&envelope).unwrap_or_default();
                        if tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    // Client → server frames are reserved for future use; ignored (§6).
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.push_hub.detach(session_id, connection_handle);
    info!(session_id = %session_id, "push channel disconnected");
}
