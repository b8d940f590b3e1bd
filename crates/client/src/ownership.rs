//! Single-claim ownership resolver.
//!
//! At most one roster entry may carry a given owner identity at a time,
//! compared case-insensitively. The party proposing a new claim clears the
//! old one locally before its element update goes out; the clearing itself
//! emits no network events — remote mirrors only learn of it through the
//! new claim or the next full snapshot.

use dragonrock_protocol::Character;

/// True when an edit moves the entry to a different owner (the only case
/// that triggers the clearing pass when the new owner is non-null).
pub fn claim_changed(previous: &Option<String>, next: &Option<String>) -> bool {
    match (previous, next) {
        (Some(p), Some(n)) => !p.eq_ignore_ascii_case(n),
        (None, Some(_)) => true,
        (Some(_), None) => true,
        (None, None) => false,
    }
}

/// Null out `owner` on every entry except `claim_index`. Local-only
/// bookkeeping; run before the claiming update is emitted so the emitted
/// roster position already reflects the cleared state.
pub fn enforce_single_claim(chars: &mut [Character], claim_index: usize, owner: &str) {
    for (index, character) in chars.iter_mut().enumerate() {
        if index != claim_index && character.owned_by(owner) {
            character.owner = None;
        }
    }
}

/// Index of the entry `identity` currently claims, if any.
pub fn find_claim(chars: &[Character], identity: &str) -> Option<usize> {
    chars.iter().position(|c| c.owned_by(identity))
}
