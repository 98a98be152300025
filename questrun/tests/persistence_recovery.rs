//! Startup recovery of `state/run_state.json`: forced pause, backup fallback
//! and the schema version gate.

use std::fs;

use questrun::core::types::LifecycleState;
use questrun::io::run_state::{RunStateStore, StateSource, StoreError};
use questrun::session::Session;
use questrun::test_support::TestSession;
use serde_json::Value;
use uuid::Uuid;

const RUN: Uuid = Uuid::from_u128(42);

fn read_json(path: &std::path::Path) -> Value {
    let raw = fs::read_to_string(path).expect("read state");
    serde_json::from_str(&raw).expect("state json")
}

/// A session closed while RUNNING reopens PAUSED, and the pause is written
/// back before any command runs.
#[test]
fn reopening_a_running_session_pauses_it_on_disk() {
    let fixture = TestSession::new();
    let run_state_path = {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.paths().run_state_path.clone()
    };
    assert_eq!(read_json(&run_state_path)["state"]["lifecycle_state"], "RUNNING");

    let session = fixture.open();
    assert_eq!(session.current_state().lifecycle_state, LifecycleState::Paused);
    assert_eq!(session.recovered_from(), Some(StateSource::Primary));
    assert_eq!(read_json(&run_state_path)["state"]["lifecycle_state"], "PAUSED");
}

/// Persisted objectives come back exactly as generated.
#[test]
fn objectives_survive_a_restart_unchanged() {
    let fixture = TestSession::new();
    let generated = {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.current_state().objective_definitions.clone()
    };
    let session = fixture.open();
    assert_eq!(session.current_state().objective_definitions, generated);
}

/// A corrupt primary falls back to the backup, which is then rewritten as the
/// new primary.
#[test]
fn corrupt_primary_recovers_from_backup() {
    let fixture = TestSession::new();
    let paths = {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.end_episode().expect("end");
        session.paths().clone()
    };
    assert!(paths.run_state_backup_path.exists());
    fs::write(&paths.run_state_path, "{ not json").expect("corrupt primary");

    let session = fixture.open();
    assert_eq!(session.recovered_from(), Some(StateSource::Backup));
    assert_eq!(session.current_state().run_id, Some(RUN));
    assert_eq!(session.current_state().lifecycle_state, LifecycleState::Paused);

    let store = RunStateStore::new(paths.run_state_path.clone());
    let loaded = store.load().expect("load").expect("state");
    assert_eq!(loaded.source, StateSource::Primary);
}

/// A primary missing entirely is recovered from the backup.
#[test]
fn missing_primary_recovers_from_backup() {
    let fixture = TestSession::new();
    let paths = {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.end_episode().expect("end");
        session.paths().clone()
    };
    fs::remove_file(&paths.run_state_path).expect("remove primary");

    let session = fixture.open();
    assert_eq!(session.recovered_from(), Some(StateSource::Backup));
    assert_eq!(session.current_state().run_id, Some(RUN));
    assert!(paths.run_state_path.exists());
}

/// An unknown schema version is refused rather than guessed at.
#[test]
fn schema_version_mismatch_is_refused() {
    let fixture = TestSession::new();
    let path = {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.paths().run_state_path.clone()
    };
    let mut doc = read_json(&path);
    doc["schema_version"] = Value::from(2);
    fs::write(&path, serde_json::to_string(&doc).expect("json")).expect("rewrite");

    let err = Session::open(fixture.root()).expect_err("schema gate");
    let store_error = err.downcast_ref::<StoreError>().expect("store error");
    assert_eq!(store_error.schema_mismatch(), Some((2, 1)));
}

/// A team state pointing at an objective that does not exist makes the file
/// malformed.
#[test]
fn dangling_team_state_is_malformed() {
    let fixture = TestSession::new();
    let paths = {
        let mut session = fixture.open();
        session.configure_teams(2).expect("teams");
        session.begin_run(Some(RUN)).expect("run");
        session.paths().clone()
    };
    fs::remove_file(&paths.run_state_backup_path).expect("remove backup");
    let path = paths.run_state_path;
    let mut doc = read_json(&path);
    doc["state"]["team_objective_states"]["1"]["1:TASK_5"] = serde_json::json!({
        "status": "AVAILABLE",
        "progress": { "deposited_count": 0 }
    });
    fs::write(&path, serde_json::to_string(&doc).expect("json")).expect("rewrite");

    let store = RunStateStore::new(path);
    let err = store.load().expect_err("dangling reference");
    assert!(matches!(err, StoreError::MalformedFile { .. }), "{err}");
}
