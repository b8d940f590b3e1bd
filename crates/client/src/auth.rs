//! Login roster and session handling.
//!
//! The credential check is a static lookup table, not a security
//! boundary: it decides which panels a client shows (the GM sees the
//! music and gallery controls). The real exclusivity comes from the
//! relay's identity lock. Login is optimistic — the session is stored
//! locally right away and rolled back if the relay answers
//! `auth:result {ok:false}`.

use serde::{Deserialize, Serialize};

use crate::store::{self, keys, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Gm,
    Player,
}

/// A locally established login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub username: String,
    pub role: Role,
}

const PLAYER_COUNT: usize = 10;

/// Check `username`/`password` against the static roster: the GM account
/// plus ten player accounts whose password equals the username.
pub fn authenticate(username: &str, password: &str) -> Option<UserSession> {
    let username = username.trim();

    if username == "gm" && password == "gm123" {
        return Some(UserSession {
            username: username.to_string(),
            role: Role::Gm,
        });
    }

    for n in 1..=PLAYER_COUNT {
        let candidate = format!("player{n}");
        if username == candidate && password == candidate {
            return Some(UserSession {
                username: candidate,
                role: Role::Player,
            });
        }
    }

    None
}

/// Persist the optimistic session.
pub fn persist_session(store: &mut dyn KeyValueStore, session: &UserSession) {
    store::set_json(store, keys::USER, session);
}

/// Load a previously persisted session.
pub fn load_session(store: &dyn KeyValueStore) -> Option<UserSession> {
    store::get_json(store, keys::USER)
}

/// Drop the session — used both for explicit logout and for rolling back
/// an optimistic login the relay rejected.
pub fn clear_session(store: &mut dyn KeyValueStore) {
    store.remove(keys::USER);
}
