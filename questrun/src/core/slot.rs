//! Stable slot identity and the `(phase, slot)` storage key.
//!
//! Slots are named positionally (`SECONDARY_2`) but their identity is the
//! variant plus index, never a position in some map. Ordering is explicit via
//! [`ObjectiveSlot::sort_key`] so listings are stable regardless of how the
//! slots were collected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::types::{Category, FIRST_PHASE, LAST_PHASE, PHASES, Phase};

/// Highest numbered `SECONDARY_n` / `TASK_n` slot.
pub const MAX_SLOT_INDEX: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectiveSlot {
    Primary,
    Secondary(u8),
    Task(u8),
}

impl ObjectiveSlot {
    /// Primary first, then secondaries, then tasks, each by index.
    pub fn sort_key(self) -> (u8, u8) {
        match self {
            ObjectiveSlot::Primary => (0, 0),
            ObjectiveSlot::Secondary(index) => (1, index),
            ObjectiveSlot::Task(index) => (2, index),
        }
    }

    /// Tier whose templates are eligible for this slot.
    pub fn category(self) -> Category {
        match self {
            ObjectiveSlot::Primary => Category::Primary,
            ObjectiveSlot::Secondary(_) => Category::Secondary,
            ObjectiveSlot::Task(_) => Category::Task,
        }
    }
}

impl Ord for ObjectiveSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for ObjectiveSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ObjectiveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveSlot::Primary => f.write_str("PRIMARY"),
            ObjectiveSlot::Secondary(index) => write!(f, "SECONDARY_{index}"),
            ObjectiveSlot::Task(index) => write!(f, "TASK_{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotParseError {
    #[error("unknown slot name '{0}'")]
    UnknownSlot(String),
    #[error("slot index out of range in '{0}' (expected 1..={MAX_SLOT_INDEX})")]
    IndexOutOfRange(String),
    #[error("invalid objective key '{0}' (expected <phase>:<SLOT>)")]
    MalformedKey(String),
    #[error("invalid phase in objective key '{0}' (expected {FIRST_PHASE}..={LAST_PHASE})")]
    InvalidPhase(String),
}

impl FromStr for ObjectiveSlot {
    type Err = SlotParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "PRIMARY" {
            return Ok(ObjectiveSlot::Primary);
        }
        let (build, digits): (fn(u8) -> ObjectiveSlot, &str) =
            if let Some(rest) = raw.strip_prefix("SECONDARY_") {
                (ObjectiveSlot::Secondary, rest)
            } else if let Some(rest) = raw.strip_prefix("TASK_") {
                (ObjectiveSlot::Task, rest)
            } else {
                return Err(SlotParseError::UnknownSlot(raw.to_string()));
            };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SlotParseError::UnknownSlot(raw.to_string()));
        }
        let index: u8 = digits
            .parse()
            .map_err(|_| SlotParseError::IndexOutOfRange(raw.to_string()))?;
        if !(1..=MAX_SLOT_INDEX).contains(&index) {
            return Err(SlotParseError::IndexOutOfRange(raw.to_string()));
        }
        Ok(build(index))
    }
}

impl Serialize for ObjectiveSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectiveSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Composite storage key, encoded as `"<phase>:<SLOT>"` (e.g. `"3:SECONDARY_2"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectiveKey {
    pub phase: Phase,
    pub slot: ObjectiveSlot,
}

impl ObjectiveKey {
    pub fn new(phase: Phase, slot: ObjectiveSlot) -> Self {
        Self { phase, slot }
    }
}

impl fmt::Display for ObjectiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.phase, self.slot)
    }
}

impl FromStr for ObjectiveKey {
    type Err = SlotParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (phase, slot) = raw
            .split_once(':')
            .ok_or_else(|| SlotParseError::MalformedKey(raw.to_string()))?;
        if phase.is_empty() || !phase.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SlotParseError::InvalidPhase(raw.to_string()));
        }
        let phase: Phase = phase
            .parse()
            .ok()
            .filter(|phase| PHASES.contains(phase))
            .ok_or_else(|| SlotParseError::InvalidPhase(raw.to_string()))?;
        Ok(Self {
            phase,
            slot: slot.parse()?,
        })
    }
}

impl Serialize for ObjectiveKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectiveKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_order_primary_secondary_task() {
        let mut slots = vec![
            ObjectiveSlot::Task(1),
            ObjectiveSlot::Secondary(2),
            ObjectiveSlot::Primary,
            ObjectiveSlot::Task(3),
            ObjectiveSlot::Secondary(1),
        ];
        slots.sort();
        let names: Vec<String> = slots.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["PRIMARY", "SECONDARY_1", "SECONDARY_2", "TASK_1", "TASK_3"]
        );
    }

    #[test]
    fn key_parses_back_into_phase_and_slot() {
        let key: ObjectiveKey = "3:SECONDARY_2".parse().expect("parse");
        assert_eq!(key, ObjectiveKey::new(3, ObjectiveSlot::Secondary(2)));
        assert_eq!(key.to_string(), "3:SECONDARY_2");
    }

    #[test]
    fn key_rejects_malformed_input() {
        for raw in [
            "3",
            "x:PRIMARY",
            ":PRIMARY",
            "3:BONUS_1",
            "3:TASK_0",
            "3:TASK_6",
            "3:TASK_",
            "3:TASK_+1",
            "-1:PRIMARY",
            "999:PRIMARY",
            "0:PRIMARY",
            "6:PRIMARY",
            "200:TASK_1",
        ] {
            assert!(raw.parse::<ObjectiveKey>().is_err(), "accepted {raw}");
        }
    }

    #[test]
    fn key_serializes_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(ObjectiveKey::new(1, ObjectiveSlot::Task(4)), 7u32);
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"1:TASK_4":7}"#);
        let back: std::collections::BTreeMap<ObjectiveKey, u32> =
            serde_json::from_str(&json).expect("parse");
        assert_eq!(back, map);
    }
}
