//! Dragonrock Protocol
//!
//! Shared types for communication between the Dragonrock relay and clients.
//! These types are serialized as JSON over WebSocket. Every message carries a
//! `type` discriminant (the event name, e.g. `state:patch`) and a typed
//! payload; room-scoped messages carry the table key inside the payload, not
//! in any transport-level room primitive.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod types;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;

/// Generate a new unique ID (used for origin/client identifiers)
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch, the clock used by `lastUpdate` and
/// dice-roll timestamps.
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
