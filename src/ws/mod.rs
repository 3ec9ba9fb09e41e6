pub mod handlers;
pub mod session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::protocol::{self, ServerMessage};
use crate::registry::RelayEvent;
use crate::state::AppState;

use session::ChatSession;

/// WebSocket upgrade handler for `/ws/chat/{room_name}`
///
/// The room is validated and the session registered before the upgrade is
/// accepted; invalid rooms are never accepted. Events published while the
/// handshake completes wait in the session's relay queue.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(params): Path<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = match session::room_from_route(&params) {
        Ok(room) => room,
        Err(e) => {
            tracing::warn!("Rejecting WebSocket connection: {}", e);
            return (StatusCode::BAD_REQUEST, Json(ServerMessage::error(&e))).into_response();
        }
    };

    tracing::info!("WebSocket connection request for room {}", room);
    let registry = state.registry.clone();
    let (session, relay_rx) = ChatSession::connect(state, room).await;
    let group = session.group().clone();
    let session_id = session.id().clone();

    ws.on_failed_upgrade(move |e| {
        tracing::warn!("WebSocket upgrade failed for session {}: {}", session_id, e);
        tokio::spawn(async move {
            registry.leave(&group, &session_id).await;
        });
    })
    .on_upgrade(move |socket| handle_socket(socket, session, relay_rx))
}

/// Handle individual WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    mut session: ChatSession,
    mut relay_rx: UnboundedReceiver<RelayEvent>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut close_code = None;

    loop {
        tokio::select! {
            // Events published to the room, including our own messages
            event = relay_rx.recv() => {
                let Some(event) = event else {
                    tracing::warn!("Relay queue closed for session {}", session.id());
                    break;
                };
                if let Some(msg) = session.relay_event(event) {
                    if send_envelope(&mut sender, &msg).await.is_err() {
                        break;
                    }
                }
            }

            // Frames from the client, handled strictly in arrival order
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let reply = match session.receive(text.as_str()).await {
                            Ok(reply) => reply,
                            Err(e) => {
                                tracing::warn!("Frame rejected for session {}: {}", session.id(), e);
                                Some(ServerMessage::error(&e))
                            }
                        };

                        if let Some(reply) = reply {
                            if send_envelope(&mut sender, &reply).await.is_err() {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_code = frame.map(|f| f.code);
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    session.disconnect(close_code).await;
}

/// Encode and write one envelope. Encoding failures are logged and skipped.
async fn send_envelope<S>(sender: &mut S, msg: &ServerMessage) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match protocol::encode(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to encode outbound message: {}", e);
            Ok(())
        }
    }
}
