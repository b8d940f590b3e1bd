//! Client → Relay messages

use serde::{Deserialize, Serialize};

use crate::types::{CharAdd, CharDelete, CharUpdate, DiceRoll, MusicControl, StatePatch};

/// Messages sent from a client to the relay.
///
/// The `type` field carries the event name. Room-scoped events carry the
/// table key inside the message; events tagged with `originClientId` let
/// receivers discard echoes of their own emissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    // Presence / identity lock
    #[serde(rename = "auth:login")]
    AuthLogin { username: String },
    #[serde(rename = "auth:logout")]
    AuthLogout,

    // Room membership
    #[serde(rename = "join", rename_all = "camelCase")]
    Join { table_id: String },

    // Coarse state: merged server-side, rebroadcast as `state:patch`
    #[serde(rename = "state:update", rename_all = "camelCase")]
    StateUpdate {
        table_id: String,
        payload: StatePatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
    #[serde(rename = "state:patch", rename_all = "camelCase")]
    StatePatch {
        table_id: String,
        payload: StatePatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },

    // Roster elements: relay passthrough, never merged server-side
    #[serde(rename = "char:update", rename_all = "camelCase")]
    CharUpdate {
        table_id: String,
        payload: CharUpdate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
    #[serde(rename = "char:delete", rename_all = "camelCase")]
    CharDelete {
        table_id: String,
        payload: CharDelete,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
    #[serde(rename = "char:add", rename_all = "camelCase")]
    CharAdd {
        table_id: String,
        payload: CharAdd,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },

    // Ephemeral channels
    #[serde(rename = "music:control", rename_all = "camelCase")]
    MusicControl {
        table_id: String,
        payload: MusicControl,
    },
    #[serde(rename = "dice:roll", rename_all = "camelCase")]
    DiceRoll {
        table_id: String,
        payload: DiceRoll,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
}

impl ClientMessage {
    /// The table key a room-scoped event targets, if any.
    pub fn table_id(&self) -> Option<&str> {
        match self {
            ClientMessage::AuthLogin { .. } | ClientMessage::AuthLogout => None,
            ClientMessage::Join { table_id }
            | ClientMessage::StateUpdate { table_id, .. }
            | ClientMessage::StatePatch { table_id, .. }
            | ClientMessage::CharUpdate { table_id, .. }
            | ClientMessage::CharDelete { table_id, .. }
            | ClientMessage::CharAdd { table_id, .. }
            | ClientMessage::MusicControl { table_id, .. }
            | ClientMessage::DiceRoll { table_id, .. } => Some(table_id),
        }
    }
}
