//! Dragonrock client library
//!
//! Everything a tabletop client needs short of actual rendering: the sync
//! engine that owns the local table mirror and speaks the relay protocol,
//! the single-claim ownership resolver, dice rolling with bounded
//! log/toast buffers, GM music transport with autoplay gating, local
//! key-value persistence, JSON export/import, the static login roster and
//! a reconnecting WebSocket connection.
//!
//! The library is UI-agnostic: edits go in as method calls, the messages
//! to emit come back as values, and remote messages are applied through
//! [`sync::SyncEngine::apply_remote`]. Rendering reacts to the returned
//! [`sync::RemoteApply`] outcome.

pub mod auth;
pub mod connection;
pub mod dice;
pub mod gallery;
pub mod music;
pub mod ownership;
pub mod store;
pub mod sync;

pub use auth::{authenticate, Role, UserSession};
pub use connection::{Connection, ConnectionStatus};
pub use dice::RollBuffer;
pub use music::{MusicController, PlayerEffect};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use sync::{ImportError, RemoteApply, SyncEngine};
