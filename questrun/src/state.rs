//! The authoritative session state persisted in `state/run_state.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::objective::{ObjectiveMap, TeamObjectiveState};
use crate::core::slot::ObjectiveKey;
use crate::core::types::{LifecycleState, Phase, TeamIndex};

/// Version stamped into every saved envelope. Files carrying any other
/// version are refused on load.
pub const SCHEMA_VERSION: u32 = 1;

/// Inclusive bounds for the number of teams.
pub const MIN_TEAMS: u8 = 2;
pub const MAX_TEAMS: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub count: u8,
    /// Player id to 1-based team index.
    #[serde(default)]
    pub player_teams: BTreeMap<Uuid, TeamIndex>,
}

impl TeamConfig {
    /// Team indices in ascending order (empty while teams are disabled).
    pub fn team_indices(&self) -> impl Iterator<Item = TeamIndex> {
        let last = if self.enabled { self.count } else { 0 };
        1..=last
    }
}

/// Per-team progress keyed by team index, then objective key.
pub type TeamObjectiveStates = BTreeMap<TeamIndex, BTreeMap<ObjectiveKey, TeamObjectiveState>>;

/// Full session state.
///
/// `objective_definitions` is filled once per run id and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub schema_version: u32,
    pub run_id: Option<Uuid>,
    pub lifecycle_state: LifecycleState,
    /// `0` while no run exists, otherwise `1..=5`.
    pub phase: Phase,
    pub episode_number: u32,
    pub team_config: TeamConfig,
    pub objective_definitions: ObjectiveMap,
    pub team_objective_states: TeamObjectiveStates,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: None,
            lifecycle_state: LifecycleState::Idle,
            phase: 0,
            episode_number: 0,
            team_config: TeamConfig::default(),
            objective_definitions: ObjectiveMap::new(),
            team_objective_states: TeamObjectiveStates::new(),
        }
    }
}

impl RunState {
    pub fn has_run(&self) -> bool {
        self.run_id.is_some()
    }

    /// Fill in an AVAILABLE state for every (team, objective) pair that has none,
    /// and drop states for teams that no longer exist.
    pub fn seed_team_objective_states(&mut self) {
        let teams: Vec<TeamIndex> = self.team_config.team_indices().collect();
        self.team_objective_states
            .retain(|team, _| teams.contains(team));
        for team in teams {
            let states = self.team_objective_states.entry(team).or_default();
            for (phase, slots) in &self.objective_definitions {
                for slot in slots.keys() {
                    states
                        .entry(ObjectiveKey::new(*phase, *slot))
                        .or_default();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::slot::ObjectiveSlot;
    use crate::test_support::definition;

    #[test]
    fn default_state_is_idle_without_run() {
        let state = RunState::default();
        assert_eq!(state.schema_version, SCHEMA_VERSION);
        assert_eq!(state.lifecycle_state, LifecycleState::Idle);
        assert!(!state.has_run());
        assert_eq!(state.phase, 0);
    }

    #[test]
    fn seeding_covers_every_team_and_objective() {
        let mut state = RunState {
            team_config: TeamConfig {
                enabled: true,
                count: 3,
                player_teams: BTreeMap::new(),
            },
            ..RunState::default()
        };
        let slots = state.objective_definitions.entry(1).or_default();
        slots.insert(ObjectiveSlot::Primary, definition(1, ObjectiveSlot::Primary, "minecraft:a"));
        slots.insert(ObjectiveSlot::Task(1), definition(1, ObjectiveSlot::Task(1), "minecraft:b"));
        state.team_objective_states.insert(7, BTreeMap::new());

        state.seed_team_objective_states();

        assert_eq!(
            state.team_objective_states.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        for states in state.team_objective_states.values() {
            assert_eq!(states.len(), 2);
        }
    }

    #[test]
    fn disabled_teams_have_no_indices() {
        let config = TeamConfig {
            enabled: false,
            count: 4,
            player_teams: BTreeMap::new(),
        };
        assert_eq!(config.team_indices().count(), 0);
    }
}
