//! Music transport: GM-gated control emission and the hidden player.
//!
//! Only the GM role emits `play`/`pause`; every other connection applies
//! received actions to a hidden player. Starting playback requires a
//! prior user interaction (autoplay policy): until one happens, play
//! intents are queued and surfaced as a pending affordance instead of an
//! error.

use serde::{Deserialize, Serialize};

use dragonrock_protocol::{ClientMessage, MusicAction, MusicControl, Track};

use crate::auth::Role;
use crate::store::{self, keys, KeyValueStore};

/// What the hidden player should do after a transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEffect {
    /// Load and play this track.
    Start(Track),
    /// Stop playback.
    Pause,
    /// Play intent queued until the user interacts with the page.
    Deferred,
    /// Nothing to do (e.g. play with no known track).
    Idle,
}

/// Client-side transport state for one connection.
pub struct MusicController {
    role: Role,
    interacted: bool,
    pending_play: bool,
    current: Option<Track>,
    playing: bool,
}

impl MusicController {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            interacted: false,
            pending_play: false,
            current: None,
            playing: false,
        }
    }

    /// Build the transport event to emit, or `None` for non-GM roles —
    /// players never broadcast transport control.
    pub fn control(
        &self,
        table_id: &str,
        action: MusicAction,
        track: Option<Track>,
    ) -> Option<ClientMessage> {
        if self.role != Role::Gm {
            return None;
        }
        Some(ClientMessage::MusicControl {
            table_id: table_id.to_string(),
            payload: MusicControl { action, track },
        })
    }

    /// Apply a received transport event to the hidden player.
    pub fn apply_remote(&mut self, control: MusicControl) -> PlayerEffect {
        if let Some(track) = control.track {
            self.current = Some(track);
        }
        match control.action {
            MusicAction::Play => {
                let Some(track) = self.current.clone() else {
                    return PlayerEffect::Idle;
                };
                if !self.interacted {
                    self.pending_play = true;
                    return PlayerEffect::Deferred;
                }
                self.playing = true;
                PlayerEffect::Start(track)
            }
            MusicAction::Pause => {
                self.playing = false;
                self.pending_play = false;
                PlayerEffect::Pause
            }
        }
    }

    /// The user interacted with the page; a queued play intent fires now.
    pub fn mark_interacted(&mut self) -> Option<Track> {
        self.interacted = true;
        if !self.pending_play {
            return None;
        }
        self.pending_play = false;
        let track = self.current.clone();
        if track.is_some() {
            self.playing = true;
        }
        track
    }

    pub fn pending_play(&self) -> bool {
        self.pending_play
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }
}

/// The GM's persisted playlist (name + data-URL payload per entry).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackList {
    tracks: Vec<Track>,
}

impl TrackList {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        store::get_json(store, keys::TRACKS).unwrap_or_default()
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) {
        store::set_json(store, keys::TRACKS, self);
    }

    pub fn add(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn remove(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.tracks.remove(index);
        }
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
