//! Client sync engine.
//!
//! Owns the canonical local copy of the table state. Local edits apply to
//! the mirror immediately (optimistic) and come back as the message to
//! emit, tagged with this client's origin id. Remote messages are applied
//! through [`SyncEngine::apply_remote`], which discards echoes of our own
//! emissions — required because the engine must tolerate a relay that
//! echoes to the sender, even though ours broadcasts to others only.

use serde_json::Value;
use tracing::{debug, warn};

use dragonrock_protocol::{
    CharAdd, CharDelete, CharUpdate, Character, ClientMessage, ServerMessage, StatePatch,
    TableState,
};

use crate::ownership;

/// Outcome of applying a remote message to the mirror.
#[derive(Debug)]
pub enum RemoteApply {
    /// Own origin id — an echo, mirror untouched.
    Echo,
    /// Coarse fields merged; re-render.
    Patched,
    /// Roster changed positionally; re-render.
    Roster,
    /// Room-state message that could not be applied (index out of range).
    Ignored,
    /// Not a state-sync message; route it elsewhere (dice, music,
    /// presence, auth results).
    Unhandled(ServerMessage),
}

/// Import failures. Nothing is applied when any check fails.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("import document must be an object")]
    NotAnObject,
    #[error("chars must be an array of characters")]
    BadChars,
}

/// Local mirror of one table plus the stable origin identifier used to
/// tag emissions and filter echoes. The origin id is injected — generated
/// once per install and persisted by the caller.
pub struct SyncEngine {
    table_id: String,
    origin_id: String,
    state: TableState,
}

impl SyncEngine {
    pub fn new(table_id: impl Into<String>, origin_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            origin_id: origin_id.into(),
            state: TableState::default(),
        }
    }

    pub fn with_state(
        table_id: impl Into<String>,
        origin_id: impl Into<String>,
        state: TableState,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            origin_id: origin_id.into(),
            state,
        }
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// Messages to emit right after the transport connects: join the
    /// table, then push the full local mirror. The push deliberately
    /// overwrites the snapshot the relay just sent us — local-first
    /// reconciliation, so the first client up after a relay restart is
    /// the source of truth.
    pub fn connect_sequence(&self) -> [ClientMessage; 2] {
        [
            ClientMessage::Join {
                table_id: self.table_id.clone(),
            },
            ClientMessage::StateUpdate {
                table_id: self.table_id.clone(),
                payload: self.state.to_patch(),
                origin_client_id: Some(self.origin_id.clone()),
            },
        ]
    }

    /// Edit the title: mirror first, then the patch to emit.
    pub fn set_title(&mut self, title: impl Into<String>) -> ClientMessage {
        let title = title.into();
        self.state.title = title.clone();
        self.coarse_patch(StatePatch {
            title: Some(title),
            ..Default::default()
        })
    }

    /// Toggle edit/play mode: mirror first, then the patch to emit.
    pub fn set_edit_mode(&mut self, edit_mode: bool) -> ClientMessage {
        self.state.edit_mode = edit_mode;
        self.coarse_patch(StatePatch {
            edit_mode: Some(edit_mode),
            ..Default::default()
        })
    }

    fn coarse_patch(&self, payload: StatePatch) -> ClientMessage {
        ClientMessage::StatePatch {
            table_id: self.table_id.clone(),
            payload,
            origin_client_id: Some(self.origin_id.clone()),
        }
    }

    /// Replace the character at `index`. When the edit claims a new owner,
    /// the single-claim pass clears that owner from every other entry
    /// before the update is emitted, so the emitted value already reflects
    /// the cleared roster. Returns `None` for an out-of-range index.
    pub fn update_character(&mut self, index: usize, value: Character) -> Option<ClientMessage> {
        if index >= self.state.chars.len() {
            return None;
        }
        let value = value.sanitized();

        let previous = &self.state.chars[index].owner;
        if ownership::claim_changed(previous, &value.owner) {
            if let Some(owner) = value.owner.as_deref() {
                ownership::enforce_single_claim(&mut self.state.chars, index, owner);
            }
        }

        self.state.chars[index] = value.clone();
        Some(ClientMessage::CharUpdate {
            table_id: self.table_id.clone(),
            payload: CharUpdate { index, value },
            origin_client_id: Some(self.origin_id.clone()),
        })
    }

    /// Append a character to the roster.
    pub fn add_character(&mut self, value: Character) -> ClientMessage {
        let value = value.sanitized();
        self.state.chars.push(value.clone());
        ClientMessage::CharAdd {
            table_id: self.table_id.clone(),
            payload: CharAdd { value },
            origin_client_id: Some(self.origin_id.clone()),
        }
    }

    /// Remove the character at `index`. Returns `None` when out of range.
    pub fn delete_character(&mut self, index: usize) -> Option<ClientMessage> {
        if index >= self.state.chars.len() {
            return None;
        }
        self.state.chars.remove(index);
        Some(ClientMessage::CharDelete {
            table_id: self.table_id.clone(),
            payload: CharDelete { index },
            origin_client_id: Some(self.origin_id.clone()),
        })
    }

    /// Apply a remote message to the mirror.
    ///
    /// Echo suppression happens here: anything tagged with our own origin
    /// id is discarded unseen. Roster events apply positionally and skip
    /// the ownership-clearing pass — the sender is trusted to have run it.
    pub fn apply_remote(&mut self, msg: ServerMessage) -> RemoteApply {
        match msg {
            ServerMessage::StatePatch {
                payload,
                origin_client_id,
            } => {
                if self.is_echo(&origin_client_id) {
                    return RemoteApply::Echo;
                }
                self.state.merge(&payload);
                RemoteApply::Patched
            }

            ServerMessage::CharUpdate {
                payload,
                origin_client_id,
            } => {
                if self.is_echo(&origin_client_id) {
                    return RemoteApply::Echo;
                }
                let CharUpdate { index, value } = payload;
                match self.state.chars.get_mut(index) {
                    Some(slot) => {
                        *slot = value;
                        RemoteApply::Roster
                    }
                    None => {
                        debug!(
                            component = "sync",
                            event = "char.update.out_of_range",
                            index,
                            len = self.state.chars.len(),
                            "Dropping element update past the roster end"
                        );
                        RemoteApply::Ignored
                    }
                }
            }

            ServerMessage::CharDelete {
                payload,
                origin_client_id,
            } => {
                if self.is_echo(&origin_client_id) {
                    return RemoteApply::Echo;
                }
                if payload.index < self.state.chars.len() {
                    self.state.chars.remove(payload.index);
                    RemoteApply::Roster
                } else {
                    RemoteApply::Ignored
                }
            }

            ServerMessage::CharAdd {
                payload,
                origin_client_id,
            } => {
                if self.is_echo(&origin_client_id) {
                    return RemoteApply::Echo;
                }
                self.state.chars.push(payload.value);
                RemoteApply::Roster
            }

            other => RemoteApply::Unhandled(other),
        }
    }

    fn is_echo(&self, origin: &Option<String>) -> bool {
        origin.as_deref() == Some(self.origin_id.as_str())
    }

    /// Export the sheet as the interchange document
    /// `{title, editMode, chars}`.
    pub fn export_json(&self) -> Value {
        serde_json::to_value(self.state.to_patch()).unwrap_or(Value::Null)
    }

    /// Import an interchange document, replacing local state wholesale.
    ///
    /// Checks are shallow field-presence only: `chars` must be an array
    /// of characters, `title` a string, `editMode` a bool. Any failure
    /// aborts with nothing applied.
    pub fn import_json(&mut self, text: &str) -> Result<(), ImportError> {
        let doc: Value = serde_json::from_str(text).inspect_err(|e| {
            warn!(
                component = "sync",
                event = "import.parse_failed",
                error = %e,
                "Import aborted, document is not JSON"
            );
        })?;
        let Some(doc) = doc.as_object() else {
            return Err(ImportError::NotAnObject);
        };

        let title = doc.get("title").and_then(Value::as_str).map(str::to_string);
        let edit_mode = doc.get("editMode").and_then(Value::as_bool);
        let chars = match doc.get("chars") {
            Some(value) if value.is_array() => Some(
                serde_json::from_value::<Vec<Character>>(value.clone())
                    .map_err(|_| ImportError::BadChars)?,
            ),
            Some(_) => return Err(ImportError::BadChars),
            None => None,
        };

        if let Some(title) = title {
            self.state.title = title;
        }
        if let Some(edit_mode) = edit_mode {
            self.state.edit_mode = edit_mode;
        }
        if let Some(chars) = chars {
            self.state.chars = chars;
        }
        Ok(())
    }
}
