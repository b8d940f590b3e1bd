//! Relay state — room registry and presence tracking.
//!
//! One `Registry` is constructed at server start and injected into the
//! router; it owns every table's shared state, the global identity lock
//! map, and the outbound channel of each live connection. All mutation
//! goes through the single registry lock, so room operations never
//! interleave.
//!
//! Known consistency gap, kept deliberately: `char:*` events are relayed
//! between peers without touching `TableState.chars`, so the snapshot a
//! late joiner receives reflects the roster as of the last full
//! `state:update`/`state:patch` — not as of the latest element event.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use dragonrock_protocol::{now_millis, ServerMessage, StatePatch, TableState};

/// Per-process connection identifier (also used as the `userId` in
/// presence events).
pub type ConnId = u64;

struct Connection {
    tx: mpsc::Sender<ServerMessage>,
    table: Option<String>,
    identity: Option<String>,
}

struct Room {
    state: TableState,
    occupants: Vec<ConnId>,
}

/// A message plus the connections it should be delivered to. Registry
/// methods stay synchronous; callers deliver outside the lock.
pub struct Broadcast {
    targets: Vec<mpsc::Sender<ServerMessage>>,
    message: ServerMessage,
}

impl Broadcast {
    pub async fn deliver(self) {
        for tx in &self.targets {
            let _ = tx.send(self.message.clone()).await;
        }
    }
}

/// Shared relay state
pub struct Registry {
    started: Instant,
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<String, Room>,
    /// Global identity lock: lowercase username → holding connection
    identities: HashMap<String, ConnId>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            connections: HashMap::new(),
            rooms: HashMap::new(),
            identities: HashMap::new(),
        }
    }

    /// Register a new connection with its outbound channel.
    pub fn connect(&mut self, id: ConnId, tx: mpsc::Sender<ServerMessage>) {
        self.connections.insert(
            id,
            Connection {
                tx,
                table: None,
                identity: None,
            },
        );
    }

    /// Take the identity lock for `username` (case-insensitive). Fails when
    /// another live connection already holds it. Re-login over the same
    /// connection rebinds, releasing the connection's previous identity.
    pub fn login(&mut self, id: ConnId, username: &str) -> Result<(), &'static str> {
        let lower = username.trim().to_lowercase();
        if lower.is_empty() {
            return Err("invalid username");
        }
        if self.identities.get(&lower).is_some_and(|held| *held != id) {
            return Err("username already in use");
        }

        self.release_identity(id);
        self.identities.insert(lower.clone(), id);
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.identity = Some(lower);
        }
        Ok(())
    }

    /// Release the identity held by `id`, if any.
    pub fn logout(&mut self, id: ConnId) {
        self.release_identity(id);
    }

    fn release_identity(&mut self, id: ConnId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        if let Some(identity) = conn.identity.take() {
            self.identities.remove(&identity);
        }
    }

    /// Move `id` into `table_id`, lazily creating the room. Returns the
    /// full-state snapshot for the joiner plus the presence broadcasts
    /// (a `user:left` for a previous room, a `user:joined` for the new one).
    pub fn join(&mut self, id: ConnId, table_id: &str) -> Option<(ServerMessage, Vec<Broadcast>)> {
        self.connections.get(&id)?;
        let mut broadcasts = Vec::new();

        let previous = self.connections.get(&id).and_then(|c| c.table.clone());
        if let Some(previous) = previous {
            if previous != table_id {
                if let Some(left) = self.leave_room(id, &previous) {
                    broadcasts.push(left);
                }
            }
        }

        let room = self.rooms.entry(table_id.to_string()).or_insert_with(|| {
            info!(
                component = "registry",
                event = "room.created",
                table_id,
                "Room created"
            );
            Room {
                state: TableState::default(),
                occupants: Vec::new(),
            }
        });
        if !room.occupants.contains(&id) {
            room.occupants.push(id);
        }
        let snapshot = ServerMessage::StatePatch {
            payload: room.state.to_patch(),
            origin_client_id: None,
        };

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.table = Some(table_id.to_string());
        }

        let joined = ServerMessage::UserJoined {
            user_id: id.to_string(),
            table_id: table_id.to_string(),
        };
        broadcasts.push(Broadcast {
            targets: self.peer_senders(table_id, id),
            message: joined,
        });

        Some((snapshot, broadcasts))
    }

    /// Shallow-merge a patch into a room's state and bump its clock. An
    /// unknown key gets a default state first (merge-into-default), matching
    /// the create-on-patch behavior of the wire contract. Last patch
    /// received wins per field; there is no version comparison.
    pub fn merge_patch(&mut self, table_id: &str, patch: &StatePatch) {
        let room = self.rooms.entry(table_id.to_string()).or_insert_with(|| Room {
            state: TableState::default(),
            occupants: Vec::new(),
        });
        room.state.merge(patch);
        room.state.last_update = now_millis();
    }

    /// Outbound channels of every room member except `except`.
    pub fn peer_senders(&self, table_id: &str, except: ConnId) -> Vec<mpsc::Sender<ServerMessage>> {
        let Some(room) = self.rooms.get(table_id) else {
            return Vec::new();
        };
        room.occupants
            .iter()
            .filter(|occupant| **occupant != except)
            .filter_map(|occupant| self.connections.get(occupant))
            .map(|conn| conn.tx.clone())
            .collect()
    }

    /// Forward a room-scoped message to every member except the sender.
    pub fn forward(&self, table_id: &str, sender: ConnId, message: ServerMessage) -> Broadcast {
        Broadcast {
            targets: self.peer_senders(table_id, sender),
            message,
        }
    }

    /// Drop a connection: release its identity, leave its room (deleting
    /// the room state when it empties), and produce the `user:left`
    /// broadcast for the remaining occupants.
    pub fn disconnect(&mut self, id: ConnId) -> Option<Broadcast> {
        self.release_identity(id);
        let table = self.connections.get(&id).and_then(|c| c.table.clone());
        let broadcast = table.and_then(|table| self.leave_room(id, &table));
        self.connections.remove(&id);
        broadcast
    }

    fn leave_room(&mut self, id: ConnId, table_id: &str) -> Option<Broadcast> {
        let room = self.rooms.get_mut(table_id)?;
        room.occupants.retain(|occupant| *occupant != id);
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.table = None;
        }

        if room.occupants.is_empty() {
            // Last occupant gone: the room's state goes with it.
            self.rooms.remove(table_id);
            debug!(
                component = "registry",
                event = "room.deleted",
                table_id,
                "Room emptied, state dropped"
            );
            return None;
        }

        Some(Broadcast {
            targets: self.peer_senders(table_id, id),
            message: ServerMessage::UserLeft {
                user_id: id.to_string(),
                table_id: table_id.to_string(),
            },
        })
    }

    pub fn table_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
