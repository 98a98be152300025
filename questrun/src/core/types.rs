//! Shared closed vocabularies for objectives and the run lifecycle.
//!
//! Every enum here serializes to the SCREAMING_SNAKE_CASE token used in rule
//! files and in `run_state.json`, so the on-disk spelling never depends on
//! Rust naming.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// One of the five ordered stages of a run (`0` only while no run exists).
pub type Phase = u8;

/// 1-based team index (`1..=team_count`).
pub type TeamIndex = u8;

/// First playable phase.
pub const FIRST_PHASE: Phase = 1;
/// Final phase; carries no secondaries and no tasks.
pub const LAST_PHASE: Phase = 5;

/// All playable phases in ascending order.
pub const PHASES: RangeInclusive<Phase> = FIRST_PHASE..=LAST_PHASE;

/// Objective tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Primary,
    Secondary,
    Task,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Primary => "PRIMARY",
            Category::Secondary => "SECONDARY",
            Category::Task => "TASK",
        }
    }

    /// Actions a template or quantity rule of this category may declare.
    pub fn allowed_actions(self) -> &'static [Action] {
        match self {
            Category::Primary => &[Action::Deliver],
            Category::Secondary => &[Action::Deliver, Action::TeamGather],
            Category::Task => &[Action::Craft, Action::Smelt],
        }
    }

    pub fn allows(self, action: Action) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a team has to do with the selected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Deliver,
    TeamGather,
    Craft,
    Smelt,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Deliver => "DELIVER",
            Action::TeamGather => "TEAM_GATHER",
            Action::Craft => "CRAFT",
            Action::Smelt => "SMELT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five (category, action) pairs every phase needs a quantity rule for.
pub const REQUIRED_QUANTITY_PAIRS: [(Category, Action); 5] = [
    (Category::Primary, Action::Deliver),
    (Category::Secondary, Action::Deliver),
    (Category::Secondary, Action::TeamGather),
    (Category::Task, Action::Craft),
    (Category::Task, Action::Smelt),
];

/// How a quantity rule produces a number. Only ranged rolls exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollMode {
    Range,
}

/// Spatial coordination requirement attached to an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CohesionMode {
    /// Deliveries go into the team's own cohesion chest.
    DeliveryChest,
    /// Gathered items must be collected within a radius around a centroid.
    GatherCluster,
}

impl CohesionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CohesionMode::DeliveryChest => "DELIVERY_CHEST",
            CohesionMode::GatherCluster => "GATHER_CLUSTER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohesion {
    pub mode: CohesionMode,
    pub radius: u32,
}

impl fmt::Display for Cohesion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} r={}", self.mode.as_str(), self.radius)
    }
}

/// Session lifecycle. A freshly loaded state is always `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Idle => "IDLE",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_action_pairing_is_closed() {
        assert!(Category::Primary.allows(Action::Deliver));
        assert!(!Category::Primary.allows(Action::TeamGather));
        assert!(Category::Secondary.allows(Action::TeamGather));
        assert!(!Category::Secondary.allows(Action::Craft));
        assert!(Category::Task.allows(Action::Smelt));
        assert!(!Category::Task.allows(Action::Deliver));
    }

    #[test]
    fn required_pairs_are_all_legal() {
        for (category, action) in REQUIRED_QUANTITY_PAIRS {
            assert!(category.allows(action), "{category}/{action}");
        }
    }

    #[test]
    fn tokens_match_file_spelling() {
        let json = serde_json::to_string(&Action::TeamGather).expect("serialize");
        assert_eq!(json, "\"TEAM_GATHER\"");
        let mode: CohesionMode = serde_json::from_str("\"GATHER_CLUSTER\"").expect("parse");
        assert_eq!(mode, CohesionMode::GatherCluster);
    }
}
