//! Local persistence behind a key-value seam.
//!
//! The sheet must survive a restart: title, mode, roster, session,
//! client id, last table and server, gallery and playlist all live in a
//! string key → string value store. The mechanics are an external
//! collaborator, so everything here goes through [`KeyValueStore`]; the
//! shipped implementation is a single JSON file, and tests use
//! [`MemoryStore`].

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use dragonrock_protocol::{new_id, TableState};

/// The persisted keys. A full reset clears all of them except the client
/// id.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const EDIT_MODE: &str = "edit_mode";
    pub const CHARS: &str = "chars";
    pub const USER: &str = "user";
    pub const CLIENT_ID: &str = "client_id";
    pub const TABLE: &str = "table";
    pub const SERVER_URL: &str = "server_url";
    pub const GALLERY_LARGE: &str = "gallery_large";
    pub const GALLERY_THUMBS: &str = "gallery_thumbs";
    pub const TRACKS: &str = "tracks";

    pub const ALL: [&str; 10] = [
        TITLE,
        EDIT_MODE,
        CHARS,
        USER,
        CLIENT_ID,
        TABLE,
        SERVER_URL,
        GALLERY_LARGE,
        GALLERY_THUMBS,
        TRACKS,
    ];
}

/// String key → string value persistence seam.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

/// Write-through store backed by one JSON file. A missing file starts
/// empty; an unreadable one is logged and treated as empty rather than
/// blocking the client from starting.
pub struct JsonFileStore {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let map = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        component = "store",
                        event = "store.corrupt",
                        path = %path.display(),
                        error = %e,
                        "Persisted store unreadable, starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, map })
    }

    fn flush(&self) {
        let json = match serde_json::to_string_pretty(&self.map) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    component = "store",
                    event = "store.serialize_failed",
                    error = %e,
                    "Skipping store flush"
                );
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!(
                component = "store",
                event = "store.write_failed",
                path = %self.path.display(),
                error = %e,
                "Skipping store flush"
            );
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
        self.flush();
    }

    fn remove(&mut self, key: &str) {
        if self.map.remove(key).is_some() {
            self.flush();
        }
    }
}

/// Read a JSON-encoded value; a malformed entry is logged and treated as
/// absent rather than aborting the caller.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                component = "store",
                event = "store.entry_corrupt",
                key,
                error = %e,
                "Ignoring unreadable persisted value"
            );
            None
        }
    }
}

pub fn set_json<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => store.set(key, &json),
        Err(e) => warn!(
            component = "store",
            event = "store.entry_serialize_failed",
            key,
            error = %e,
            "Skipping persisted value"
        ),
    }
}

/// Clear every persisted key except the client id — the origin identifier
/// belongs to the install, not to any one sheet or session.
pub fn reset_all(store: &mut dyn KeyValueStore) {
    for key in keys::ALL {
        if key != keys::CLIENT_ID {
            store.remove(key);
        }
    }
}

/// The stable per-install origin identifier: created once, persisted, and
/// injected into whatever needs to tag or compare origins.
pub fn client_id(store: &mut dyn KeyValueStore) -> String {
    if let Some(id) = store.get(keys::CLIENT_ID) {
        return id;
    }
    let id = new_id();
    store.set(keys::CLIENT_ID, &id);
    id
}

/// Assemble the locally persisted sheet (defaults fill the gaps).
pub fn load_table(store: &dyn KeyValueStore) -> TableState {
    let mut state = TableState::default();
    if let Some(title) = store.get(keys::TITLE) {
        state.title = title;
    }
    if let Some(edit_mode) = get_json(store, keys::EDIT_MODE) {
        state.edit_mode = edit_mode;
    }
    if let Some(chars) = get_json(store, keys::CHARS) {
        state.chars = chars;
    }
    state
}

/// Persist the sheet's coarse fields and roster.
pub fn save_table(store: &mut dyn KeyValueStore, state: &TableState) {
    store.set(keys::TITLE, &state.title);
    set_json(store, keys::EDIT_MODE, &state.edit_mode);
    set_json(store, keys::CHARS, &state.chars);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragonrock_protocol::Character;

    #[test]
    fn table_round_trips_through_a_store() {
        let mut store = MemoryStore::default();
        let mut state = TableState::default();
        state.title = "Saved".to_string();
        state.edit_mode = false;
        state.chars.push(Character::default());

        save_table(&mut store, &state);
        let loaded = load_table(&store);

        assert_eq!(loaded.title, "Saved");
        assert!(!loaded.edit_mode);
        assert_eq!(loaded.chars.len(), 1);
    }

    #[test]
    fn client_id_is_stable_across_loads() {
        let mut store = MemoryStore::default();
        let first = client_id(&mut store);
        let second = client_id(&mut store);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn reset_clears_everything_but_the_client_id() {
        let mut store = MemoryStore::default();
        for key in keys::ALL {
            store.set(key, "value");
        }

        reset_all(&mut store);

        for key in keys::ALL {
            if key == keys::CLIENT_ID {
                assert!(store.get(key).is_some(), "client id must survive reset");
            } else {
                assert_eq!(store.get(key), None, "{key} survived reset");
            }
        }
    }

    #[test]
    fn corrupt_entries_read_as_absent() {
        let mut store = MemoryStore::default();
        store.set(keys::CHARS, "{definitely not json");

        let loaded = load_table(&store);
        assert!(loaded.chars.is_empty());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        {
            let mut store = JsonFileStore::open(&path).expect("open");
            store.set(keys::TITLE, "On Disk");
            store.set(keys::TABLE, "table-9");
        }

        let store = JsonFileStore::open(&path).expect("reopen");
        assert_eq!(store.get(keys::TITLE).as_deref(), Some("On Disk"));
        assert_eq!(store.get(keys::TABLE).as_deref(), Some("table-9"));
    }

    #[test]
    fn file_store_survives_a_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json at all").expect("write");

        let store = JsonFileStore::open(&path).expect("open despite corruption");
        assert_eq!(store.get(keys::TITLE), None);
    }
}
