//! Relay → Client messages

use serde::{Deserialize, Serialize};

use crate::types::{CharAdd, CharDelete, CharUpdate, DiceRoll, MusicControl, StatePatch};

/// Messages sent from the relay to clients.
///
/// Relayed events (`state:patch`, `char:*`, `dice:roll`, `music:control`)
/// carry the sender's `originClientId` through verbatim when present; the
/// full-snapshot `state:patch` sent on join carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "auth:result")]
    AuthResult {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "state:patch", rename_all = "camelCase")]
    StatePatch {
        payload: StatePatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },

    #[serde(rename = "char:update", rename_all = "camelCase")]
    CharUpdate {
        payload: CharUpdate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
    #[serde(rename = "char:delete", rename_all = "camelCase")]
    CharDelete {
        payload: CharDelete,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },
    #[serde(rename = "char:add", rename_all = "camelCase")]
    CharAdd {
        payload: CharAdd,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },

    #[serde(rename = "music:control", rename_all = "camelCase")]
    MusicControl { payload: MusicControl },
    #[serde(rename = "dice:roll", rename_all = "camelCase")]
    DiceRoll {
        payload: DiceRoll,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_client_id: Option<String>,
    },

    // Informational presence events
    #[serde(rename = "user:joined", rename_all = "camelCase")]
    UserJoined { user_id: String, table_id: String },
    #[serde(rename = "user:left", rename_all = "camelCase")]
    UserLeft { user_id: String, table_id: String },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}
