//! Reconnecting WebSocket connection to the relay.
//!
//! One background task owns the socket. Outgoing messages go through a
//! bounded channel and are dropped (with a log line) when the client is
//! offline and the buffer fills — the sheet stays fully usable without a
//! relay, sync just stops. Connect failures retry a fixed number of times
//! with a fixed backoff; the current [`ConnectionStatus`] is published on
//! a watch channel and is the single visible signal of sync health.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use dragonrock_protocol::{ClientMessage, ServerMessage};

/// Consecutive failed connect attempts before giving up.
pub const RETRY_ATTEMPTS: u32 = 5;

/// Fixed delay between connect attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Handle to the connection task.
pub struct Connection {
    outbound: mpsc::Sender<ClientMessage>,
    status: watch::Receiver<ConnectionStatus>,
}

impl Connection {
    /// Spawn the connection task. Returns the handle plus the stream of
    /// incoming relay messages.
    pub fn open(url: impl Into<String>) -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::open_with_handshake(url, Vec::new())
    }

    /// Like [`Connection::open`], but replays `handshake` on every
    /// established connection — including reconnects, where the room
    /// membership and the local-first state push must be redone from
    /// scratch (there is no session resumption).
    pub fn open_with_handshake(
        url: impl Into<String>,
        handshake: Vec<ClientMessage>,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        tokio::spawn(run_connection(
            url.into(),
            handshake,
            outbound_rx,
            inbound_tx,
            status_tx,
        ));

        (
            Self {
                outbound: outbound_tx,
                status: status_rx,
            },
            inbound_rx,
        )
    }

    /// Queue a message for the relay. Fire-and-forget: when the task has
    /// given up or the offline buffer is full, the message is dropped.
    pub fn send(&self, msg: ClientMessage) {
        if let Err(e) = self.outbound.try_send(msg) {
            debug!(
                component = "connection",
                event = "conn.send.dropped",
                error = %e,
                "Dropping outbound message, no live sync"
            );
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Wait until the connection is established. Returns `false` when the
    /// task has given up instead.
    pub async fn wait_connected(&mut self) -> bool {
        loop {
            if *self.status.borrow() == ConnectionStatus::Connected {
                return true;
            }
            if self.status.changed().await.is_err() {
                return false;
            }
        }
    }
}

async fn run_connection(
    url: String,
    handshake: Vec<ClientMessage>,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    inbound_tx: mpsc::Sender<ServerMessage>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut failures = 0u32;

    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);

        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                failures += 1;
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                warn!(
                    component = "connection",
                    event = "conn.connect_failed",
                    url = %url,
                    attempt = failures,
                    error = %e,
                    "Connect attempt failed"
                );
                if failures >= RETRY_ATTEMPTS {
                    warn!(
                        component = "connection",
                        event = "conn.gave_up",
                        url = %url,
                        "Retries exhausted, staying offline"
                    );
                    return;
                }
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };

        failures = 0;
        info!(
            component = "connection",
            event = "conn.established",
            url = %url,
            "Connected to relay"
        );

        let (mut sink, mut stream) = ws.split();

        // Re-join and re-push on every establishment; membership does not
        // survive a reconnect.
        let mut handshake_ok = true;
        for msg in &handshake {
            let Ok(json) = serde_json::to_string(msg) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                handshake_ok = false;
                break;
            }
        }
        if !handshake_ok {
            let _ = status_tx.send(ConnectionStatus::Disconnected);
            continue;
        }
        let _ = status_tx.send(ConnectionStatus::Connected);

        loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => {
                    let Some(msg) = outgoing else {
                        // handle dropped — close and stop for good
                        let _ = sink.close().await;
                        let _ = status_tx.send(ConnectionStatus::Disconnected);
                        return;
                    };
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(
                                component = "connection",
                                event = "conn.serialize_failed",
                                error = %e,
                                "Skipping unserializable message"
                            );
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(text.as_str()) {
                                Ok(msg) => {
                                    if inbound_tx.send(msg).await.is_err() {
                                        // receiver dropped — nobody is listening
                                        let _ = status_tx.send(ConnectionStatus::Disconnected);
                                        return;
                                    }
                                }
                                Err(e) => {
                                    debug!(
                                        component = "connection",
                                        event = "conn.recv.unparseable",
                                        error = %e,
                                        "Ignoring unparseable relay frame"
                                    );
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(
                                component = "connection",
                                event = "conn.recv.error",
                                error = %e,
                                "WebSocket error"
                            );
                            break;
                        }
                    }
                }
            }
        }

        let _ = status_tx.send(ConnectionStatus::Disconnected);
        info!(
            component = "connection",
            event = "conn.lost",
            url = %url,
            "Connection lost, will retry"
        );
    }
}
