//! Generated objective definitions and per-team objective state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::slot::ObjectiveSlot;
use super::types::{Action, Category, Cohesion, Phase};

/// Where a generated objective came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub template_id: String,
    pub pool_id: String,
    pub quantity_rule_id: String,
    #[serde(default)]
    pub constraint_ids_applied: Vec<String>,
}

/// A concrete objective bound to one `(phase, slot)`.
///
/// Definitions are self-describing: everything needed to present or score the
/// objective is stored here, so nothing is re-derived from content on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveDefinition {
    pub runtime_id: u32,
    pub phase: Phase,
    pub slot_key: ObjectiveSlot,
    pub category: Category,
    pub action: Action,
    pub item_id: String,
    pub quantity_required: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohesion: Option<Cohesion>,
    pub provenance: Provenance,
}

pub type PhaseObjectives = BTreeMap<ObjectiveSlot, ObjectiveDefinition>;

/// All generated objectives of a run, keyed by phase then slot.
pub type ObjectiveMap = BTreeMap<Phase, PhaseObjectives>;

/// Number of definitions across all phases.
pub fn objective_count(map: &ObjectiveMap) -> usize {
    map.values().map(BTreeMap::len).sum()
}

/// Definitions in listing order: ascending phase, then PRIMARY, SECONDARY_n,
/// TASK_n. Restricted to one phase when `phase` is set.
pub fn ordered_objectives(map: &ObjectiveMap, phase: Option<Phase>) -> Vec<&ObjectiveDefinition> {
    map.iter()
        .filter(|(p, _)| phase.is_none_or(|wanted| **p == wanted))
        .flat_map(|(_, slots)| slots.values())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectiveStatus {
    #[default]
    Available,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub deposited_count: u32,
}

/// Placeholder progress container for one team on one objective.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamObjectiveState {
    #[serde(default)]
    pub status: ObjectiveStatus,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
