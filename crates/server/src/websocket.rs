//! WebSocket handling
//!
//! One task pair per connection: the read loop parses client events and
//! dispatches them against the registry; a forwarder task drains the
//! connection's outbound channel into the socket. Handler errors never
//! tear down the accept loop. Ping frames are answered by the transport
//! layer itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use dragonrock_protocol::{ClientMessage, ServerMessage};

use crate::state::{ConnId, Registry};

pub type SharedRegistry = Arc<Mutex<Registry>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedRegistry>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: SharedRegistry) {
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        "WebSocket connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Channel for sending messages to this client; the registry holds a
    // clone so room broadcasts and direct replies share one ordered queue.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(100);
    state.lock().await.connect(conn_id, outbound_tx.clone());

    // Spawn task to forward messages to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&server_msg) {
                Ok(json) => json,
                Err(e) => {
                    error!(
                        component = "websocket",
                        event = "ws.send.serialize_failed",
                        connection_id = conn_id,
                        error = %e,
                        "Failed to serialize server message"
                    );
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, client disconnected"
                );
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!(
                    component = "websocket",
                    event = "ws.connection.close_frame",
                    connection_id = conn_id,
                    "Client sent close frame"
                );
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        // Parse client message
        let client_msg: ClientMessage = match serde_json::from_str(&msg) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    connection_id = conn_id,
                    error = %e,
                    payload_bytes = msg.len(),
                    "Failed to parse client message"
                );
                let _ = outbound_tx
                    .send(ServerMessage::Error {
                        code: "parse_error".into(),
                        message: e.to_string(),
                    })
                    .await;
                continue;
            }
        };

        handle_client_message(client_msg, conn_id, &state, &outbound_tx).await;
    }

    // Disconnect cleanup: identity lock released, room membership dropped,
    // remaining occupants notified, empty rooms deleted.
    let left = state.lock().await.disconnect(conn_id);
    if let Some(broadcast) = left {
        broadcast.deliver().await;
    }

    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        "WebSocket connection closed"
    );
    send_task.abort();
}

/// Dispatch one parsed client event.
///
/// Events with an empty table key or an empty patch payload are dropped
/// without a reply — the relay surfaces no error for malformed room events.
async fn handle_client_message(
    msg: ClientMessage,
    conn_id: ConnId,
    state: &SharedRegistry,
    client_tx: &mpsc::Sender<ServerMessage>,
) {
    match msg {
        ClientMessage::AuthLogin { username } => {
            let result = state.lock().await.login(conn_id, &username);
            let reply = match result {
                Ok(()) => {
                    info!(
                        component = "websocket",
                        event = "auth.login",
                        connection_id = conn_id,
                        username = %username.trim().to_lowercase(),
                        "Identity lock taken"
                    );
                    ServerMessage::AuthResult {
                        ok: true,
                        reason: None,
                    }
                }
                Err(reason) => {
                    info!(
                        component = "websocket",
                        event = "auth.rejected",
                        connection_id = conn_id,
                        reason,
                        "Login rejected"
                    );
                    ServerMessage::AuthResult {
                        ok: false,
                        reason: Some(reason.to_string()),
                    }
                }
            };
            let _ = client_tx.send(reply).await;
        }

        ClientMessage::AuthLogout => {
            state.lock().await.logout(conn_id);
        }

        ClientMessage::Join { table_id } => {
            if table_id.is_empty() {
                debug!(
                    component = "websocket",
                    event = "ws.message.dropped",
                    connection_id = conn_id,
                    "Join without table key dropped"
                );
                return;
            }
            let joined = state.lock().await.join(conn_id, &table_id);
            let Some((snapshot, broadcasts)) = joined else {
                return;
            };
            let _ = client_tx.send(snapshot).await;
            for broadcast in broadcasts {
                broadcast.deliver().await;
            }
            info!(
                component = "websocket",
                event = "room.joined",
                connection_id = conn_id,
                table_id = %table_id,
                "Connection joined table"
            );
        }

        // `state:update` and `state:patch` share merge-and-rebroadcast
        // semantics: fold the partial payload into the room state, then
        // forward it to every other occupant.
        ClientMessage::StateUpdate {
            table_id,
            payload,
            origin_client_id,
        }
        | ClientMessage::StatePatch {
            table_id,
            payload,
            origin_client_id,
        } => {
            if table_id.is_empty() || payload.is_empty() {
                debug!(
                    component = "websocket",
                    event = "ws.message.dropped",
                    connection_id = conn_id,
                    "Empty state patch dropped"
                );
                return;
            }
            let broadcast = {
                let mut registry = state.lock().await;
                registry.merge_patch(&table_id, &payload);
                registry.forward(
                    &table_id,
                    conn_id,
                    ServerMessage::StatePatch {
                        payload,
                        origin_client_id,
                    },
                )
            };
            broadcast.deliver().await;
        }

        // Roster element events are peer passthrough only: the relay never
        // folds them into its own TableState (the late-join staleness
        // window this opens is part of the contract).
        ClientMessage::CharUpdate {
            table_id,
            payload,
            origin_client_id,
        } => {
            forward_to_room(
                state,
                conn_id,
                &table_id,
                ServerMessage::CharUpdate {
                    payload,
                    origin_client_id,
                },
            )
            .await;
        }
        ClientMessage::CharDelete {
            table_id,
            payload,
            origin_client_id,
        } => {
            forward_to_room(
                state,
                conn_id,
                &table_id,
                ServerMessage::CharDelete {
                    payload,
                    origin_client_id,
                },
            )
            .await;
        }
        ClientMessage::CharAdd {
            table_id,
            payload,
            origin_client_id,
        } => {
            forward_to_room(
                state,
                conn_id,
                &table_id,
                ServerMessage::CharAdd {
                    payload,
                    origin_client_id,
                },
            )
            .await;
        }

        ClientMessage::MusicControl { table_id, payload } => {
            forward_to_room(
                state,
                conn_id,
                &table_id,
                ServerMessage::MusicControl { payload },
            )
            .await;
        }

        ClientMessage::DiceRoll {
            table_id,
            payload,
            origin_client_id,
        } => {
            forward_to_room(
                state,
                conn_id,
                &table_id,
                ServerMessage::DiceRoll {
                    payload,
                    origin_client_id,
                },
            )
            .await;
        }
    }
}

/// Forward an ephemeral or passthrough event to every other room member.
async fn forward_to_room(
    state: &SharedRegistry,
    sender: ConnId,
    table_id: &str,
    message: ServerMessage,
) {
    if table_id.is_empty() {
        debug!(
            component = "websocket",
            event = "ws.message.dropped",
            connection_id = sender,
            "Room event without table key dropped"
        );
        return;
    }
    let broadcast = state.lock().await.forward(table_id, sender, message);
    broadcast.deliver().await;
}
