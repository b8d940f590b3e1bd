//! Core types shared across the protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Core stats are clamped to this maximum
pub const STAT_MAX: u32 = 10;

/// Extra (free-form) stats are clamped to this maximum
pub const EXTRA_STAT_MAX: u32 = 20;

/// Die sizes a roll may use
pub const DIE_SIZES: [u32; 7] = [4, 6, 8, 10, 12, 20, 100];

/// Title given to a lazily-created table
pub const DEFAULT_TITLE: &str = "default";

/// Shared state of one table.
///
/// One instance lives per table key on the relay, created on first join and
/// deleted when the last occupant leaves. The character list is only folded
/// in server-side via full `state:update`/`state:patch` payloads — `char:*`
/// events bypass it by design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableState {
    pub title: String,
    pub edit_mode: bool,
    pub chars: Vec<Character>,
    pub last_update: u64,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            edit_mode: true,
            chars: Vec::new(),
            last_update: 0,
        }
    }
}

impl TableState {
    /// Shallow-merge a patch: fields present in the patch overwrite, fields
    /// absent are left alone. Later patches win per field — there is no
    /// timestamp or version comparison.
    pub fn merge(&mut self, patch: &StatePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(edit_mode) = patch.edit_mode {
            self.edit_mode = edit_mode;
        }
        if let Some(chars) = &patch.chars {
            self.chars = chars.clone();
        }
    }

    /// A patch carrying every coarse field (the full-snapshot form used on
    /// join and on the post-connect reconciliation push).
    pub fn to_patch(&self) -> StatePatch {
        StatePatch {
            title: Some(self.title.clone()),
            edit_mode: Some(self.edit_mode),
            chars: Some(self.chars.clone()),
        }
    }
}

/// Partial-field update for the coarse table state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars: Option<Vec<Character>>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.edit_mode.is_none() && self.chars.is_none()
    }
}

/// Health bar of a character: `current <= max`, `max >= 1`, `shield >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub current: u32,
    pub max: u32,
    pub shield: u32,
}

impl Health {
    pub fn clamped(self) -> Self {
        let max = self.max.max(1);
        Self {
            current: self.current.min(max),
            max,
            shield: self.shield,
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self {
            current: 10,
            max: 10,
            shield: 0,
        }
    }
}

/// The five named stats, each independently clamped to 0–10.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreStats {
    pub strength: u32,
    pub agility: u32,
    pub intellect: u32,
    pub will: u32,
    pub scouting: u32,
}

impl CoreStats {
    pub fn clamped(self) -> Self {
        Self {
            strength: self.strength.min(STAT_MAX),
            agility: self.agility.min(STAT_MAX),
            intellect: self.intellect.min(STAT_MAX),
            will: self.will.min(STAT_MAX),
            scouting: self.scouting.min(STAT_MAX),
        }
    }
}

/// One entry in a table's roster.
///
/// Characters are addressed by their position in the list — there is no
/// stable id, so reordering invalidates in-flight index-based events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub class: String,
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub health: Health,
    pub stats: CoreStats,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_stats: BTreeMap<String, u32>,
    pub passive: String,
    #[serde(default)]
    pub inspiration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            name: "New Character".to_string(),
            class: "Class".to_string(),
            level: 1,
            image: None,
            health: Health::default(),
            stats: CoreStats::default(),
            extra_stats: BTreeMap::new(),
            passive: String::new(),
            inspiration: 0,
            owner: None,
        }
    }
}

impl Character {
    /// Enforce the field invariants: level >= 1, health clamps, core stats
    /// 0–10, extra stats 0–20, owner lowercase-normalized (empty → none).
    pub fn sanitized(mut self) -> Self {
        self.level = self.level.max(1);
        self.health = self.health.clamped();
        self.stats = self.stats.clamped();
        for value in self.extra_stats.values_mut() {
            *value = (*value).min(EXTRA_STAT_MAX);
        }
        self.owner = self
            .owner
            .map(|o| o.trim().to_lowercase())
            .filter(|o| !o.is_empty());
        self
    }

    /// True when `identity` (case-insensitive) holds the claim on this entry.
    pub fn owned_by(&self, identity: &str) -> bool {
        self.owner
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case(identity))
    }

    /// Insert or overwrite an extra stat. Names are unique case-insensitively:
    /// an existing entry whose name matches ignoring case is replaced.
    pub fn set_extra_stat(&mut self, name: &str, value: u32) {
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            return;
        }
        self.extra_stats
            .retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.extra_stats.insert(name, value.min(EXTRA_STAT_MAX));
    }

    /// Rename an extra stat, keeping its value. A collision with another
    /// entry (case-insensitive) replaces that entry.
    pub fn rename_extra_stat(&mut self, old: &str, new: &str) {
        let new = new.trim().to_uppercase();
        if new.is_empty() || new.eq_ignore_ascii_case(old) {
            return;
        }
        let Some(value) = self.extra_stats.remove(old) else {
            return;
        };
        self.extra_stats.retain(|k, _| !k.eq_ignore_ascii_case(&new));
        self.extra_stats.insert(new, value);
    }

    pub fn remove_extra_stat(&mut self, name: &str) {
        self.extra_stats.remove(name);
    }
}

/// Replace the character at `index` with `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharUpdate {
    pub index: usize,
    pub value: Character,
}

/// Remove the character at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharDelete {
    pub index: usize,
}

/// Append `value` to the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharAdd {
    pub value: Character,
}

/// One dice roll, relayed to the room and buffered client-side. Never part
/// of `TableState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRoll {
    pub name: String,
    #[serde(rename = "dice")]
    pub die: u32,
    pub result: u32,
    pub ts: u64,
}

impl DiceRoll {
    /// Boundary validation: known die size and a result inside [1, die].
    pub fn is_valid(&self) -> bool {
        DIE_SIZES.contains(&self.die) && self.result >= 1 && self.result <= self.die
    }
}

/// Music transport action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicAction {
    Play,
    Pause,
}

/// An audio track: display name plus an opaque data-URL payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub name: String,
    pub data_url: String,
}

/// Transport control relayed to the room. `track` accompanies `play` when
/// the sender wants receivers to switch source first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicControl {
    pub action: MusicAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,
}
