//! Durable run state: `run_state.json` plus its `.tmp` and `.bak` siblings.
//!
//! Saves go through the temp file and rotate the previous primary into the
//! single backup, so a crash at any point leaves either a complete primary or
//! a complete backup on disk. Loads fall back to the backup when the primary
//! is unusable and always hand back a `PAUSED` state.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::objective::ObjectiveDefinition;
use crate::core::slot::ObjectiveKey;
use crate::core::types::{LifecycleState, Phase};
use crate::state::{RunState, SCHEMA_VERSION, TeamConfig, TeamObjectiveStates};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize run state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("{}: schema version mismatch (found {found}, expected {expected})", path.display())]
    SchemaMismatch {
        path: PathBuf,
        found: u64,
        expected: u32,
    },
    #[error("{}: malformed run state: {reason}", path.display())]
    MalformedFile { path: PathBuf, reason: String },
    #[error(
        "run state unrecoverable: primary {} ({primary_error}); backup {} ({backup_error})",
        primary.display(),
        backup.display()
    )]
    CorruptPersistence {
        primary: PathBuf,
        primary_error: Box<StoreError>,
        backup: PathBuf,
        backup_error: Box<StoreError>,
    },
}

impl StoreError {
    /// `(found, expected)` when this error is, or wraps, a schema mismatch on
    /// the primary file.
    pub fn schema_mismatch(&self) -> Option<(u64, u32)> {
        match self {
            StoreError::SchemaMismatch {
                found, expected, ..
            } => Some((*found, *expected)),
            StoreError::CorruptPersistence { primary_error, .. } => primary_error.schema_mismatch(),
            _ => None,
        }
    }

    fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::MalformedFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Which file a state was recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSource {
    Primary,
    Backup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    /// Always `PAUSED`.
    pub state: RunState,
    pub source: StateSource,
    /// Lifecycle as written in the file, before the forced pause.
    pub persisted_lifecycle: LifecycleState,
}

/// On-disk shape of the state: objective definitions flattened to
/// `"<phase>:<SLOT>"` keys.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    run_id: Option<Uuid>,
    lifecycle_state: LifecycleState,
    phase: Phase,
    episode_number: u32,
    #[serde(default)]
    team_config: TeamConfig,
    #[serde(default)]
    objective_definitions: BTreeMap<ObjectiveKey, ObjectiveDefinition>,
    #[serde(default)]
    team_objective_states: TeamObjectiveStates,
}

#[derive(Serialize)]
struct Envelope<'a> {
    schema_version: u32,
    state: &'a PersistedState,
}

impl PersistedState {
    fn from_state(state: &RunState) -> Self {
        let objective_definitions = state
            .objective_definitions
            .iter()
            .flat_map(|(phase, slots)| {
                slots
                    .iter()
                    .map(move |(slot, def)| (ObjectiveKey::new(*phase, *slot), def.clone()))
            })
            .collect();
        Self {
            run_id: state.run_id,
            lifecycle_state: state.lifecycle_state,
            phase: state.phase,
            episode_number: state.episode_number,
            team_config: state.team_config.clone(),
            objective_definitions,
            team_objective_states: state.team_objective_states.clone(),
        }
    }

    /// Rebuild the nested state, checking that every key agrees with the data
    /// it points at.
    fn into_state(self, path: &Path) -> Result<RunState, StoreError> {
        let mut state = RunState {
            schema_version: SCHEMA_VERSION,
            run_id: self.run_id,
            lifecycle_state: self.lifecycle_state,
            phase: self.phase,
            episode_number: self.episode_number,
            team_config: self.team_config,
            ..RunState::default()
        };
        for (key, def) in self.objective_definitions {
            if key.phase != def.phase || key.slot != def.slot_key {
                return Err(StoreError::malformed(
                    path,
                    format!(
                        "objective_definitions key {key} disagrees with its definition ({}:{})",
                        def.phase, def.slot_key
                    ),
                ));
            }
            if def.category != key.slot.category() || !def.category.allows(def.action) {
                return Err(StoreError::malformed(
                    path,
                    format!(
                        "objective {key} holds a {}/{} definition",
                        def.category, def.action
                    ),
                ));
            }
            state
                .objective_definitions
                .entry(key.phase)
                .or_default()
                .insert(key.slot, def);
        }
        for (team, states) in &self.team_objective_states {
            for key in states.keys() {
                let known = state
                    .objective_definitions
                    .get(&key.phase)
                    .is_some_and(|slots| slots.contains_key(&key.slot));
                if !known {
                    return Err(StoreError::malformed(
                        path,
                        format!("team {team} has state for unknown objective {key}"),
                    ));
                }
            }
        }
        state.team_objective_states = self.team_objective_states;
        Ok(state)
    }
}

/// Reads and writes the primary/temp/backup triple for one session.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    primary: PathBuf,
    temp: PathBuf,
    backup: PathBuf,
}

impl RunStateStore {
    /// Store rooted at `primary` (`.../run_state.json`); the temp and backup
    /// files sit next to it.
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        Self {
            temp: primary.with_extension("json.tmp"),
            backup: primary.with_extension("json.bak"),
            primary,
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Remove an unusable primary so the next save does not rotate it over
    /// the backup it was recovered from.
    pub fn discard_primary(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.primary) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io("remove", &self.primary, err)),
        }
    }

    /// Persist `state` under the current schema version.
    pub fn save(&self, state: &RunState) -> Result<(), StoreError> {
        debug!(
            path = %self.primary.display(),
            run_id = ?state.run_id,
            lifecycle = %state.lifecycle_state,
            "writing run state"
        );
        let persisted = PersistedState::from_state(state);
        let mut buf = serde_json::to_string_pretty(&Envelope {
            schema_version: SCHEMA_VERSION,
            state: &persisted,
        })
        .map_err(StoreError::Serialize)?;
        buf.push('\n');

        if let Some(parent) = self.primary.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StoreError::io("create directory", parent, err))?;
        }

        let mut file =
            File::create(&self.temp).map_err(|err| StoreError::io("create", &self.temp, err))?;
        file.write_all(buf.as_bytes())
            .map_err(|err| StoreError::io("write", &self.temp, err))?;
        file.sync_all()
            .map_err(|err| StoreError::io("sync", &self.temp, err))?;
        drop(file);

        if self.primary.exists() {
            fs::rename(&self.primary, &self.backup)
                .map_err(|err| StoreError::io("rotate backup", &self.backup, err))?;
        }
        if let Err(err) = fs::rename(&self.temp, &self.primary) {
            debug!(error = %err, "rename failed, falling back to copy");
            fs::copy(&self.temp, &self.primary)
                .map_err(|err| StoreError::io("copy", &self.primary, err))?;
            fs::remove_file(&self.temp)
                .map_err(|err| StoreError::io("remove", &self.temp, err))?;
        }
        Ok(())
    }

    /// Recover the last saved state.
    ///
    /// `Ok(None)` means nothing was ever saved. A valid primary wins; an
    /// unusable primary falls back to the backup; if neither can be used the
    /// load fails.
    pub fn load(&self) -> Result<Option<LoadedState>, StoreError> {
        if self.temp.exists() {
            warn!(path = %self.temp.display(), "ignoring leftover temp run state");
        }
        let primary_exists = self.primary.exists();
        let backup_exists = self.backup.exists();

        if !primary_exists && !backup_exists {
            debug!(path = %self.primary.display(), "no run state on disk");
            return Ok(None);
        }

        if !primary_exists {
            warn!(path = %self.backup.display(), "primary run state missing, recovering from backup");
            return read_state(&self.backup).map(|loaded| Some(loaded.with_source(StateSource::Backup)));
        }

        match read_state(&self.primary) {
            Ok(loaded) => Ok(Some(loaded.with_source(StateSource::Primary))),
            Err(primary_error) if !backup_exists => Err(primary_error),
            Err(primary_error) => {
                warn!(
                    error = %primary_error,
                    backup = %self.backup.display(),
                    "primary run state unusable, trying backup"
                );
                match read_state(&self.backup) {
                    Ok(loaded) => Ok(Some(loaded.with_source(StateSource::Backup))),
                    Err(backup_error) => Err(StoreError::CorruptPersistence {
                        primary: self.primary.clone(),
                        primary_error: Box::new(primary_error),
                        backup: self.backup.clone(),
                        backup_error: Box::new(backup_error),
                    }),
                }
            }
        }
    }
}

struct ReadState {
    state: RunState,
    persisted_lifecycle: LifecycleState,
}

impl ReadState {
    fn with_source(self, source: StateSource) -> LoadedState {
        info!(
            source = ?source,
            run_id = ?self.state.run_id,
            phase = self.state.phase,
            "run state loaded"
        );
        LoadedState {
            state: self.state,
            source,
            persisted_lifecycle: self.persisted_lifecycle,
        }
    }
}

fn read_state(path: &Path) -> Result<ReadState, StoreError> {
    debug!(path = %path.display(), "reading run state");
    let contents = fs::read_to_string(path).map_err(|err| StoreError::io("read", path, err))?;
    let mut envelope: Value = serde_json::from_str(&contents)
        .map_err(|err| StoreError::malformed(path, format!("invalid JSON: {err}")))?;

    let found = envelope
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::malformed(path, "missing integer schema_version"))?;
    if found != u64::from(SCHEMA_VERSION) {
        return Err(StoreError::SchemaMismatch {
            path: path.to_path_buf(),
            found,
            expected: SCHEMA_VERSION,
        });
    }

    let state_value = envelope
        .get_mut("state")
        .map(Value::take)
        .ok_or_else(|| StoreError::malformed(path, "missing state"))?;
    let persisted: PersistedState = serde_json::from_value(state_value)
        .map_err(|err| StoreError::malformed(path, err.to_string()))?;
    let persisted_lifecycle = persisted.lifecycle_state;
    let mut state = persisted.into_state(path)?;
    state.lifecycle_state = LifecycleState::Paused;
    Ok(ReadState {
        state,
        persisted_lifecycle,
    })
}
