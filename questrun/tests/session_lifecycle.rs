//! End-to-end run lifecycle through [`Session`]: generation, violations,
//! re-roll policy and episode bookkeeping against an on-disk session root.

use questrun::core::generator::GenerationError;
use questrun::core::slot::ObjectiveSlot;
use questrun::core::types::{Category, LifecycleState};
use questrun::io::config::{GenerationConfig, SessionConfig};
use questrun::io::run_state::RunStateStore;
use questrun::test_support::{TestSession, default_raw_content, overlapping_raw_content};
use uuid::Uuid;

const RUN: Uuid = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);

fn reroll_config() -> SessionConfig {
    SessionConfig {
        generation: GenerationConfig {
            reroll_tier_overlaps: true,
        },
        ..SessionConfig::default()
    }
}

/// Same content and run id in two independent roots yields identical objectives.
#[test]
fn generation_is_deterministic_per_run_id() {
    let first = TestSession::new();
    let second = TestSession::new();
    let mut a = first.open();
    let mut b = second.open();
    a.begin_run(Some(RUN)).expect("run a");
    b.begin_run(Some(RUN)).expect("run b");
    assert_eq!(
        a.current_state().objective_definitions,
        b.current_state().objective_definitions
    );
}

/// Phases 1-4 carry PRIMARY, two SECONDARY and 1-3 TASK slots; phase 5 only
/// PRIMARY. Runtime ids run from 1 in listing order.
#[test]
fn generated_layout_follows_phase_rules() {
    let fixture = TestSession::new();
    let mut session = fixture.open();
    let started = session.begin_run(Some(RUN)).expect("run");
    let state = session.current_state();

    assert_eq!(state.lifecycle_state, LifecycleState::Running);
    assert_eq!(state.phase, 1);
    assert_eq!(state.episode_number, 1);
    assert_eq!(state.objective_definitions.len(), 5);

    for (phase, slots) in &state.objective_definitions {
        let tiers = |category: Category| slots.values().filter(|d| d.category == category).count();
        assert_eq!(tiers(Category::Primary), 1, "phase {phase}");
        if *phase == 5 {
            assert_eq!(slots.len(), 1, "phase 5");
        } else {
            assert_eq!(tiers(Category::Secondary), 2, "phase {phase}");
            assert!((1..=3).contains(&tiers(Category::Task)), "phase {phase}");
        }
        for (slot, def) in slots {
            assert_eq!(*slot, def.slot_key);
            assert_eq!(def.phase, *phase);
            assert_eq!(def.category, slot.category());
            assert!(def.category.allows(def.action));
        }
    }

    let ids: Vec<u32> = session
        .generated_objectives(None)
        .iter()
        .map(|def| def.runtime_id)
        .collect();
    let expected: Vec<u32> = (1..=ids.len() as u32).collect();
    assert_eq!(ids, expected);
    assert_eq!(started.objectives, ids.len());
}

/// Quantities land on the rule's step grid and primaries carry the cohesion
/// of their template.
#[test]
fn quantities_and_cohesion_follow_content() {
    let fixture = TestSession::new();
    let mut session = fixture.open();
    session.begin_run(Some(RUN)).expect("run");
    for def in session.generated_objectives(None) {
        let base = 4 * u32::from(def.phase);
        assert!(def.quantity_required >= base && def.quantity_required <= base + 12);
        assert_eq!((def.quantity_required - base) % 4, 0);
        if def.slot_key == ObjectiveSlot::Primary {
            let cohesion = def.cohesion.expect("primary cohesion");
            assert_eq!(cohesion.radius, 8);
        } else {
            assert!(def.cohesion.is_none());
        }
    }
}

/// Without re-rolling, a forced cross-tier overlap is reported but the run
/// still starts and is persisted.
#[test]
fn overlap_violations_do_not_block_the_run() {
    let fixture = TestSession::with_content(&overlapping_raw_content(&["minecraft:iron_ingot"]));
    let mut session = fixture.open();
    let started = session.begin_run(Some(RUN)).expect("run");

    assert!(!started.violations.is_empty());
    assert!(started.violations.iter().all(|v| v.rule_id == "no_tier_overlap"));
    assert!(started.violations[0].message.contains("minecraft:iron_ingot"));

    let store = RunStateStore::new(session.paths().run_state_path.clone());
    let loaded = store.load().expect("load").expect("state saved");
    assert_eq!(loaded.state.objective_definitions, session.current_state().objective_definitions);
    assert_eq!(session.violations().expect("violations"), started.violations);
}

/// With re-rolling on, colliding secondaries are re-drawn until they differ.
#[test]
fn reroll_resolves_overlaps_within_budget() {
    let mut raw = overlapping_raw_content(&["minecraft:iron_ingot", "minecraft:oak_log"]);
    for file in &mut raw.generator_rules {
        file.doc.generation.retry_budget_total = 200;
        file.doc.generation.retry_budget_per_slot = 50;
    }
    let fixture = TestSession::with_content(&raw);
    fixture.write_config(&reroll_config());
    let mut session = fixture.open();
    let started = session.begin_run(Some(RUN)).expect("run");

    assert!(started.violations.is_empty(), "{:?}", started.violations);
    for def in session.generated_objectives(None) {
        if def.category == Category::Secondary {
            assert_eq!(def.item_id, "minecraft:oak_log");
        }
    }
}

/// When no candidate can satisfy the guard, generation fails and nothing is
/// written.
#[test]
fn reroll_exhaustion_leaves_state_untouched() {
    let fixture = TestSession::with_content(&overlapping_raw_content(&["minecraft:iron_ingot"]));
    fixture.write_config(&reroll_config());
    let mut session = fixture.open();
    let err = session.begin_run(Some(RUN)).expect_err("exhausted");

    let generation = err.downcast_ref::<GenerationError>().expect("generation error");
    assert!(matches!(
        generation,
        GenerationError::GenerationExhausted {
            phase: 1,
            slot: ObjectiveSlot::Secondary(1),
            slot_retries: 10,
            ..
        }
    ));
    assert!(session.current_state().run_id.is_none());
    assert!(!session.paths().run_state_path.exists());
}

/// Content errors surface before any state is touched.
#[test]
fn invalid_content_refuses_to_start() {
    let mut raw = default_raw_content();
    raw.quantity_rules.pop();
    let fixture = TestSession::with_content(&raw);
    let mut session = fixture.open();
    let err = session.begin_run(Some(RUN)).expect_err("missing coverage");
    assert!(format!("{err:#}").contains("quantity rule"), "{err:#}");
    assert!(!session.paths().run_state_path.exists());
}

/// A full episode cycle survives reopening the session.
#[test]
fn episodes_persist_across_reopen() {
    let fixture = TestSession::new();
    {
        let mut session = fixture.open();
        session.begin_run(Some(RUN)).expect("run");
        session.end_episode().expect("end");
        assert_eq!(session.start_episode().expect("start"), 2);
    }
    let mut session = fixture.open();
    let state = session.current_state();
    assert_eq!(state.run_id, Some(RUN));
    assert_eq!(state.episode_number, 2);
    assert_eq!(state.lifecycle_state, LifecycleState::Paused);
    assert_eq!(session.start_episode().expect("resume"), 3);
}
