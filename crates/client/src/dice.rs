//! Dice rolling and the bounded roll buffers.
//!
//! A roll animates at a fixed cadence before settling on a final uniform
//! draw; every tick value is itself a uniform draw so the spinner never
//! shows an impossible face. Rolls feed two transient buffers — a short
//! log and an even shorter toast feed. Received rolls are NOT filtered by
//! origin (the roller wants their own roll in the shared feed), so the
//! buffers de-duplicate by timestamp instead: the roller's own entry
//! arrives once locally and possibly again as an echo.

use std::collections::VecDeque;
use std::time::Duration;

use rand::Rng;

use dragonrock_protocol::{now_millis, Character, DiceRoll, DIE_SIZES};

/// Animation cadence of a roll
pub const ROLL_TICK: Duration = Duration::from_millis(80);

/// Total animation time before the final draw
pub const ROLL_DURATION: Duration = Duration::from_millis(800);

/// Capacity of the roll log
pub const LOG_CAPACITY: usize = 8;

/// Capacity of the toast feed
pub const TOAST_CAPACITY: usize = 3;

/// One uniform draw in `[1, die]`.
pub fn draw(die: u32) -> u32 {
    rand::rng().random_range(1..=die.max(1))
}

/// Animated roll: `on_tick` sees each intermediate face at the fixed
/// cadence, and the settled result is returned after the fixed duration.
/// Not cancellable mid-roll — it always runs to completion.
pub async fn roll_animated<F>(die: u32, mut on_tick: F) -> u32
where
    F: FnMut(u32),
{
    let ticks = ROLL_DURATION.as_millis() / ROLL_TICK.as_millis();
    for _ in 0..ticks {
        on_tick(draw(die));
        tokio::time::sleep(ROLL_TICK).await;
    }
    draw(die)
}

/// Build the record for a settled roll, stamped with the current time.
pub fn make_roll(name: impl Into<String>, die: u32, result: u32) -> DiceRoll {
    DiceRoll {
        name: name.into(),
        die,
        result,
        ts: now_millis(),
    }
}

/// The display name a roll is attributed to: the character this identity
/// owns, a typed-in fallback, or "Unknown".
pub fn roller_name(chars: &[Character], identity: Option<&str>, fallback: &str) -> String {
    if let Some(identity) = identity {
        if let Some(owned) = chars.iter().find(|c| c.owned_by(identity)) {
            let trimmed = owned.name.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if fallback.is_empty() {
        "Unknown".to_string()
    } else {
        fallback.to_string()
    }
}

/// Newest-first bounded buffer of rolls, de-duplicated by timestamp.
/// A transient UI affordance, not an audit log.
pub struct RollBuffer {
    capacity: usize,
    entries: VecDeque<DiceRoll>,
}

impl RollBuffer {
    pub fn log() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn toast() -> Self {
        Self::with_capacity(TOAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a roll. Invalid records (unknown die, impossible result)
    /// and duplicates of an already-buffered timestamp are dropped.
    /// Returns whether the buffer changed.
    pub fn record(&mut self, roll: DiceRoll) -> bool {
        if !roll.is_valid() {
            return false;
        }
        if self.entries.iter().any(|existing| existing.ts == roll.ts) {
            return false;
        }
        self.entries.push_front(roll);
        self.entries.truncate(self.capacity);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiceRoll> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The die sizes offered by the roll panels.
pub fn die_sizes() -> &'static [u32] {
    &DIE_SIZES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_stay_in_range_for_every_die() {
        for &die in die_sizes() {
            for _ in 0..200 {
                let value = draw(die);
                assert!((1..=die).contains(&value), "d{die} drew {value}");
            }
        }
    }

    #[test]
    fn every_face_of_a_small_die_shows_up() {
        // 600 draws of a d4 missing a face outright would be a broken RNG
        // hookup, not bad luck
        let mut seen = [false; 4];
        for _ in 0..600 {
            seen[(draw(4) - 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s), "faces seen: {:?}", seen);
    }

    #[tokio::test(start_paused = true)]
    async fn animated_roll_ticks_within_range_and_settles() {
        let mut ticks = Vec::new();
        let result = roll_animated(20, |face| ticks.push(face)).await;

        assert_eq!(ticks.len() as u128, ROLL_DURATION.as_millis() / ROLL_TICK.as_millis());
        assert!(ticks.iter().all(|face| (1..=20).contains(face)));
        assert!((1..=20).contains(&result));
    }

    #[test]
    fn buffers_are_bounded_and_newest_first() {
        let mut log = RollBuffer::log();
        for ts in 0..20u64 {
            log.record(DiceRoll {
                name: "GM".to_string(),
                die: 6,
                result: 3,
                ts,
            });
        }

        assert_eq!(log.len(), LOG_CAPACITY);
        let newest = log.iter().next().expect("non-empty");
        assert_eq!(newest.ts, 19);
    }

    #[test]
    fn duplicate_timestamps_are_dropped() {
        // the roller's own roll reaches the toast feed twice: once locally
        // and once as a relay echo
        let mut toasts = RollBuffer::toast();
        let roll = make_roll("Mara", 20, 11);

        assert!(toasts.record(roll.clone()));
        assert!(!toasts.record(roll));
        assert_eq!(toasts.len(), 1);
    }

    #[test]
    fn invalid_rolls_never_enter_a_buffer() {
        let mut log = RollBuffer::log();
        assert!(!log.record(DiceRoll {
            name: "cheat".to_string(),
            die: 6,
            result: 9,
            ts: 1,
        }));
        assert!(!log.record(DiceRoll {
            name: "odd".to_string(),
            die: 7,
            result: 3,
            ts: 2,
        }));
        assert!(log.is_empty());
    }

    #[test]
    fn roller_name_prefers_the_owned_character() {
        let mut owned = Character::default();
        owned.name = "Mara the Swift".to_string();
        owned.owner = Some("mara".to_string());
        let chars = vec![Character::default(), owned];

        assert_eq!(
            roller_name(&chars, Some("MARA"), "typed"),
            "Mara the Swift"
        );
        assert_eq!(roller_name(&chars, Some("oren"), "typed"), "typed");
        assert_eq!(roller_name(&chars, None, ""), "Unknown");
    }
}
