//! Session orchestration: ties config, content, generation and the run state
//! store together behind the operations the CLI exposes.
//!
//! Every mutating operation builds the next state, persists it, and only then
//! adopts it, so the in-memory state never runs ahead of what is on disk.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::constraints::{
    NO_ITEM_OVERLAP_ACROSS_TIERS, TierOverlapGuard, Violation, validate_phase,
};
use crate::core::content::{ContentSnapshot, ContentSummary};
use crate::core::generator::{AcceptAll, CandidateCheck, generate};
use crate::core::objective::{ObjectiveDefinition, ObjectiveMap, objective_count, ordered_objectives};
use crate::core::types::{FIRST_PHASE, LifecycleState, Phase, TeamIndex};
use crate::io::config::{SessionConfig, load_config};
use crate::io::content_store::load_content;
use crate::io::init::SessionPaths;
use crate::io::run_state::{RunStateStore, StateSource};
use crate::state::{MAX_TEAMS, MIN_TEAMS, RunState, TeamConfig};

/// A session operation whose precondition does not hold. Nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("run {0} is already active; reset before starting another")]
    RunAlreadyActive(Uuid),
    #[error("no active run; start one first")]
    NoActiveRun,
    #[error("an episode is already running")]
    AlreadyRunning,
    #[error("no episode is running")]
    NotRunning,
    #[error("team count {0} is outside {MIN_TEAMS}..={MAX_TEAMS}")]
    TeamCountOutOfRange(u8),
    #[error("teams are not configured")]
    TeamsNotConfigured,
    #[error("team {team} is outside 1..={count}")]
    TeamOutOfRange { team: TeamIndex, count: u8 },
    #[error("player {0} is not assigned to a team")]
    PlayerNotAssigned(Uuid),
    #[error("objective listing is debug-only; set `debug = true` in config.toml")]
    DebugDisabled,
}

/// Outcome of [`Session::begin_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStarted {
    pub run_id: Uuid,
    pub objectives: usize,
    /// Constraint violations found in the generated set. Reported, not blocking.
    pub violations: Vec<Violation>,
}

#[derive(Debug)]
pub struct Session {
    paths: SessionPaths,
    config: SessionConfig,
    store: RunStateStore,
    content: Option<ContentSnapshot>,
    state: RunState,
    recovered_from: Option<StateSource>,
}

impl Session {
    /// Open the session rooted at `root`: read config and recover the run
    /// state. Content is loaded lazily.
    ///
    /// A state that was RUNNING when last written is persisted back as PAUSED
    /// before anything else happens.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = SessionPaths::new(root);
        let config = load_config(&paths.config_path)?;
        let store = RunStateStore::new(paths.run_state_path.clone());

        let loaded = store
            .load()
            .with_context(|| format!("load run state {}", paths.run_state_path.display()))?;

        let (state, recovered_from) = match loaded {
            None => (RunState::default(), None),
            Some(loaded) => {
                let mut needs_write = false;
                if loaded.source == StateSource::Backup {
                    warn!(
                        path = %store.primary_path().display(),
                        "run state recovered from backup; rewriting primary"
                    );
                    store.discard_primary()?;
                    needs_write = true;
                }
                if loaded.persisted_lifecycle == LifecycleState::Running {
                    warn!(run_id = ?loaded.state.run_id, "session was running at shutdown; paused");
                    needs_write = true;
                }
                if needs_write {
                    store.save(&loaded.state).context("persist recovered run state")?;
                }
                (loaded.state, Some(loaded.source))
            }
        };

        Ok(Self {
            paths,
            config,
            store,
            content: None,
            state,
            recovered_from,
        })
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    /// Where the state came from when the session was opened.
    pub fn recovered_from(&self) -> Option<StateSource> {
        self.recovered_from
    }

    pub fn current_state(&self) -> &RunState {
        &self.state
    }

    /// Write `state` and make it current.
    pub fn persist(&mut self, state: RunState) -> Result<()> {
        self.store
            .save(&state)
            .with_context(|| format!("save run state {}", self.store.primary_path().display()))?;
        self.state = state;
        Ok(())
    }

    /// Load content from disk and swap it in. A failed load keeps the current
    /// snapshot.
    pub fn reload_content(&mut self) -> Result<ContentSummary> {
        let root = self.config.resolve_content_root(&self.paths.root);
        let snapshot =
            load_content(&root).with_context(|| format!("load content {}", root.display()))?;
        let summary = snapshot.summary();
        self.content = Some(snapshot);
        Ok(summary)
    }

    /// Active content, loading it on first use.
    pub fn content(&mut self) -> Result<&ContentSnapshot> {
        if self.content.is_none() {
            self.reload_content()?;
        }
        self.content
            .as_ref()
            .context("content snapshot missing after load")
    }

    /// Generate objectives for a new run and start its first episode.
    pub fn begin_run(&mut self, run_id: Option<Uuid>) -> Result<RunStarted> {
        if let Some(active) = self.state.run_id {
            return Err(LifecycleError::RunAlreadyActive(active).into());
        }
        let run_id = run_id.unwrap_or_else(Uuid::new_v4);
        if self.content.is_none() {
            self.reload_content()?;
        }
        let reroll = self.config.generation.reroll_tier_overlaps;
        let existing = &self.state.objective_definitions;
        let content = self
            .content
            .as_ref()
            .context("content snapshot missing after load")?;

        let overlap_rule_enabled = content
            .enabled_rules()
            .iter()
            .any(|rule| rule.kind == NO_ITEM_OVERLAP_ACROSS_TIERS);
        let check: &dyn CandidateCheck = if reroll && overlap_rule_enabled {
            &TierOverlapGuard
        } else {
            &AcceptAll
        };

        let objectives = generate(content, run_id, existing, check)
            .with_context(|| format!("generate objectives for run {run_id}"))?;
        let violations = validate_objectives(content, &objectives);
        for violation in &violations {
            warn!(rule = %violation.rule_id, "{}", violation.message);
        }

        let mut next = self.state.clone();
        next.run_id = Some(run_id);
        next.lifecycle_state = LifecycleState::Running;
        next.phase = FIRST_PHASE;
        next.episode_number = 1;
        next.objective_definitions = objectives;
        next.seed_team_objective_states();
        let count = objective_count(&next.objective_definitions);
        self.persist(next)?;

        info!(run_id = %run_id, objectives = count, violations = violations.len(), "run started");
        Ok(RunStarted {
            run_id,
            objectives: count,
            violations,
        })
    }

    /// Constraint violations in the current run's objectives.
    pub fn violations(&mut self) -> Result<Vec<Violation>> {
        let objectives = self.state.objective_definitions.clone();
        let content = self.content()?;
        Ok(validate_objectives(content, &objectives))
    }

    /// Current run's objectives in listing order, optionally for one phase.
    pub fn generated_objectives(&self, phase: Option<Phase>) -> Vec<&ObjectiveDefinition> {
        ordered_objectives(&self.state.objective_definitions, phase)
    }

    /// [`Session::generated_objectives`], refused unless `debug` is enabled.
    pub fn debug_objectives(&self, phase: Option<Phase>) -> Result<Vec<&ObjectiveDefinition>> {
        if !self.config.debug {
            return Err(LifecycleError::DebugDisabled.into());
        }
        Ok(self.generated_objectives(phase))
    }

    /// Resume a paused run.
    pub fn start_episode(&mut self) -> Result<u32> {
        if !self.state.has_run() {
            return Err(LifecycleError::NoActiveRun.into());
        }
        if self.state.lifecycle_state == LifecycleState::Running {
            return Err(LifecycleError::AlreadyRunning.into());
        }
        let mut next = self.state.clone();
        next.lifecycle_state = LifecycleState::Running;
        next.episode_number += 1;
        let episode = next.episode_number;
        self.persist(next)?;
        info!(episode, "episode started");
        Ok(episode)
    }

    /// Pause a running run.
    pub fn end_episode(&mut self) -> Result<()> {
        if self.state.lifecycle_state != LifecycleState::Running {
            return Err(LifecycleError::NotRunning.into());
        }
        let mut next = self.state.clone();
        next.lifecycle_state = LifecycleState::Paused;
        self.persist(next)?;
        info!(episode = self.state.episode_number, "episode ended");
        Ok(())
    }

    /// Drop the run entirely. Team configuration is kept.
    pub fn reset(&mut self) -> Result<()> {
        let next = RunState {
            team_config: self.state.team_config.clone(),
            ..RunState::default()
        };
        let previous = self.state.run_id;
        self.persist(next)?;
        info!(run_id = ?previous, "run reset");
        Ok(())
    }

    /// Enable `count` teams. Existing player assignments are cleared.
    pub fn configure_teams(&mut self, count: u8) -> Result<()> {
        if !(MIN_TEAMS..=MAX_TEAMS).contains(&count) {
            return Err(LifecycleError::TeamCountOutOfRange(count).into());
        }
        let mut next = self.state.clone();
        next.team_config = TeamConfig {
            enabled: true,
            count,
            player_teams: Default::default(),
        };
        next.seed_team_objective_states();
        self.persist(next)?;
        info!(count, "teams configured");
        Ok(())
    }

    pub fn assign_player(&mut self, player: Uuid, team: TeamIndex) -> Result<()> {
        let teams = &self.state.team_config;
        if !teams.enabled {
            return Err(LifecycleError::TeamsNotConfigured.into());
        }
        if team < 1 || team > teams.count {
            return Err(LifecycleError::TeamOutOfRange {
                team,
                count: teams.count,
            }
            .into());
        }
        let mut next = self.state.clone();
        next.team_config.player_teams.insert(player, team);
        self.persist(next)?;
        info!(player = %player, team, "player assigned");
        Ok(())
    }

    pub fn unassign_player(&mut self, player: Uuid) -> Result<()> {
        if !self.state.team_config.enabled {
            return Err(LifecycleError::TeamsNotConfigured.into());
        }
        if !self.state.team_config.player_teams.contains_key(&player) {
            return Err(LifecycleError::PlayerNotAssigned(player).into());
        }
        let mut next = self.state.clone();
        next.team_config.player_teams.remove(&player);
        self.persist(next)?;
        info!(player = %player, "player unassigned");
        Ok(())
    }
}

/// Run the enabled hard constraints over every phase.
fn validate_objectives(content: &ContentSnapshot, objectives: &ObjectiveMap) -> Vec<Violation> {
    let rules = content.enabled_rules();
    objectives
        .keys()
        .flat_map(|phase| {
            let defs = ordered_objectives(objectives, Some(*phase));
            validate_phase(*phase, &rules, &defs)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestSession;

    #[test]
    fn begin_run_refuses_when_a_run_exists() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        session.begin_run(Some(Uuid::from_u128(1))).expect("first run");
        let err = session
            .begin_run(Some(Uuid::from_u128(2)))
            .expect_err("second run");
        assert_eq!(
            err.downcast_ref::<LifecycleError>(),
            Some(&LifecycleError::RunAlreadyActive(Uuid::from_u128(1)))
        );
    }

    #[test]
    fn episode_cycle_counts_episodes() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        session.begin_run(Some(Uuid::from_u128(5))).expect("run");
        assert_eq!(session.current_state().episode_number, 1);
        session.end_episode().expect("end");
        assert_eq!(session.current_state().lifecycle_state, LifecycleState::Paused);
        assert_eq!(session.start_episode().expect("start"), 2);
        let err = session.start_episode().expect_err("already running");
        assert_eq!(
            err.downcast_ref::<LifecycleError>(),
            Some(&LifecycleError::AlreadyRunning)
        );
    }

    #[test]
    fn start_episode_needs_a_run() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        let err = session.start_episode().expect_err("no run");
        assert_eq!(
            err.downcast_ref::<LifecycleError>(),
            Some(&LifecycleError::NoActiveRun)
        );
    }

    #[test]
    fn reset_keeps_teams_and_clears_run() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        session.configure_teams(3).expect("teams");
        session.begin_run(Some(Uuid::from_u128(8))).expect("run");
        session.reset().expect("reset");
        let state = session.current_state();
        assert!(state.run_id.is_none());
        assert_eq!(state.lifecycle_state, LifecycleState::Idle);
        assert_eq!(state.phase, 0);
        assert_eq!(state.episode_number, 0);
        assert!(state.objective_definitions.is_empty());
        assert!(state.team_objective_states.is_empty());
        assert_eq!(state.team_config.count, 3);
    }

    #[test]
    fn team_operations_check_their_bounds() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        let player = Uuid::from_u128(77);

        let err = session.assign_player(player, 1).expect_err("no teams");
        assert_eq!(
            err.downcast_ref::<LifecycleError>(),
            Some(&LifecycleError::TeamsNotConfigured)
        );
        assert!(session.configure_teams(1).is_err());
        assert!(session.configure_teams(9).is_err());

        session.configure_teams(2).expect("teams");
        assert!(session.assign_player(player, 3).is_err());
        assert!(session.assign_player(player, 0).is_err());
        session.assign_player(player, 2).expect("assign");
        assert_eq!(session.current_state().team_config.player_teams[&player], 2);
        session.unassign_player(player).expect("unassign");
        assert!(session.unassign_player(player).is_err());
    }

    #[test]
    fn objective_listing_is_debug_gated() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        session.begin_run(Some(Uuid::from_u128(3))).expect("run");
        let err = session.debug_objectives(None).expect_err("gated");
        assert_eq!(
            err.downcast_ref::<LifecycleError>(),
            Some(&LifecycleError::DebugDisabled)
        );
        assert!(!session.generated_objectives(None).is_empty());
    }

    #[test]
    fn configuring_teams_seeds_objective_states() {
        let fixture = TestSession::new();
        let mut session = fixture.open();
        session.begin_run(Some(Uuid::from_u128(4))).expect("run");
        session.configure_teams(4).expect("teams");
        let state = session.current_state();
        let objectives = objective_count(&state.objective_definitions);
        assert_eq!(state.team_objective_states.len(), 4);
        for states in state.team_objective_states.values() {
            assert_eq!(states.len(), objectives);
        }
    }
}
