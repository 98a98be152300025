//! Test-only helpers: a complete valid content tree, objective builders and a
//! throwaway session root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tempfile::TempDir;
use uuid::Uuid;

use crate::core::content::{
    ConstraintFile, CountRange, GeneratorPhaseRule, ItemPool, ObjectiveTemplate, PickRange,
    QuantityRule, RawContent, RetryBudget, SlotRule, SourceFile, TaskRule,
};
use crate::core::objective::{ObjectiveDefinition, Provenance};
use crate::core::slot::ObjectiveSlot;
use crate::core::types::{
    Action, Category, CohesionMode, LAST_PHASE, LifecycleState, PHASES, Phase, REQUIRED_QUANTITY_PAIRS,
    RollMode,
};
use crate::io::config::{SessionConfig, write_config};
use crate::io::content_store::{
    CONSTRAINTS_DIR, GENERATOR_RULES_DIR, ITEM_POOLS_DIR, OBJECTIVE_TEMPLATES_DIR,
    QUANTITY_RULES_DIR,
};
use crate::session::Session;
use crate::state::{RunState, TeamConfig};

fn source<T>(dir: &str, stem: &str, doc: T) -> SourceFile<T> {
    SourceFile {
        path: PathBuf::from(dir).join(format!("{stem}.json")),
        stem: stem.to_string(),
        doc,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn pool(id: &str, items: &[&str]) -> SourceFile<ItemPool> {
    source(
        ITEM_POOLS_DIR,
        id,
        ItemPool {
            id: id.to_string(),
            items: strings(items),
        },
    )
}

pub fn template(
    id: &str,
    category: Category,
    action: Action,
    pools: &[&str],
    constraints: &[&str],
) -> SourceFile<ObjectiveTemplate> {
    source(
        OBJECTIVE_TEMPLATES_DIR,
        id,
        ObjectiveTemplate {
            id: id.to_string(),
            category,
            action,
            pool_refs: strings(pools),
            pick: PickRange { min: 1, max: 1 },
            constraints: strings(constraints),
        },
    )
}

/// Generator rule with the locked slot layout: two secondaries and 1..=3 tasks
/// in phases 1-4, primary only in the last phase.
pub fn phase_rule(phase: Phase) -> SourceFile<GeneratorPhaseRule> {
    let last = phase == LAST_PHASE;
    let doc = GeneratorPhaseRule {
        phase,
        primary: SlotRule {
            count: 1,
            eligible_templates: strings(&["primary_deliver"]),
        },
        secondary: SlotRule {
            count: if last { 0 } else { 2 },
            eligible_templates: if last {
                Vec::new()
            } else {
                strings(&["secondary_deliver", "secondary_gather"])
            },
        },
        tasks: TaskRule {
            count: if last {
                CountRange { min: 0, max: 0 }
            } else {
                CountRange { min: 1, max: 3 }
            },
            eligible_templates: if last {
                Vec::new()
            } else {
                strings(&["task_craft", "task_smelt"])
            },
            cap_per_team: if last { 0 } else { 2 },
        },
        generation: RetryBudget {
            retry_budget_total: 40,
            retry_budget_per_slot: 10,
        },
    };
    source(GENERATOR_RULES_DIR, &format!("phase{phase}"), doc)
}

/// A complete, valid content set covering every phase.
pub fn default_raw_content() -> RawContent {
    let item_pools = vec![
        pool(
            "crafted",
            &[
                "minecraft:chest",
                "minecraft:crafting_table",
                "minecraft:furnace",
                "minecraft:torch",
            ],
        ),
        pool(
            "logs",
            &["minecraft:birch_log", "minecraft:oak_log", "minecraft:spruce_log"],
        ),
        pool(
            "ores",
            &[
                "minecraft:coal",
                "minecraft:copper_ingot",
                "minecraft:gold_ingot",
                "minecraft:iron_ingot",
            ],
        ),
        pool(
            "smelted",
            &[
                "minecraft:brick",
                "minecraft:glass",
                "minecraft:smooth_stone",
                "minecraft:stone",
            ],
        ),
    ];

    let constraints = vec![
        source(
            CONSTRAINTS_DIR,
            "cohesion_delivery_chest",
            ConstraintFile {
                id: Some("cohesion_delivery_chest".to_string()),
                kind: Some("cohesion".to_string()),
                enabled: true,
                mode: Some(CohesionMode::DeliveryChest),
                radius: Some(8),
            },
        ),
        source(
            CONSTRAINTS_DIR,
            "no_tier_overlap",
            ConstraintFile {
                id: Some("no_tier_overlap".to_string()),
                kind: Some("no_item_overlap_across_tiers".to_string()),
                enabled: true,
                mode: None,
                radius: None,
            },
        ),
    ];

    let objective_templates = vec![
        template(
            "primary_deliver",
            Category::Primary,
            Action::Deliver,
            &["ores", "logs"],
            &["cohesion_delivery_chest", "no_tier_overlap"],
        ),
        template(
            "secondary_deliver",
            Category::Secondary,
            Action::Deliver,
            &["logs", "ores"],
            &["no_tier_overlap"],
        ),
        template(
            "secondary_gather",
            Category::Secondary,
            Action::TeamGather,
            &["logs"],
            &[],
        ),
        template(
            "task_craft",
            Category::Task,
            Action::Craft,
            &["crafted"],
            &["no_tier_overlap"],
        ),
        template("task_smelt", Category::Task, Action::Smelt, &["smelted"], &[]),
    ];

    let mut quantity_rules = Vec::new();
    for phase in PHASES {
        for (category, action) in REQUIRED_QUANTITY_PAIRS {
            let id = format!(
                "p{phase}_{}_{}",
                category.as_str().to_lowercase(),
                action.as_str().to_lowercase()
            );
            let base = 4 * u32::from(phase);
            quantity_rules.push(source(
                QUANTITY_RULES_DIR,
                &id,
                QuantityRule {
                    id: id.clone(),
                    phase,
                    category,
                    action,
                    roll_mode: RollMode::Range,
                    min: base,
                    max: base + 12,
                    step: 4,
                },
            ));
        }
    }

    let generator_rules = PHASES.map(phase_rule).collect();

    RawContent {
        item_pools,
        constraints,
        objective_templates,
        quantity_rules,
        generator_rules,
    }
}

fn write_docs<T: Serialize>(root: &Path, files: &[SourceFile<T>]) -> Result<()> {
    for file in files {
        let dir = root.join(file.path.parent().unwrap_or_else(|| Path::new("")));
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
        let path = dir.join(format!("{}.json", file.stem));
        let mut buf = serde_json::to_string_pretty(&file.doc)?;
        buf.push('\n');
        fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    }
    Ok(())
}

/// Write `raw` under `root`, one file per entity in its kind's directory.
pub fn write_raw_content(root: &Path, raw: &RawContent) -> Result<()> {
    write_docs(root, &raw.item_pools)?;
    write_docs(root, &raw.constraints)?;
    write_docs(root, &raw.objective_templates)?;
    write_docs(root, &raw.quantity_rules)?;
    write_docs(root, &raw.generator_rules)?;
    Ok(())
}

pub fn write_default_content(root: &Path) -> Result<()> {
    write_raw_content(root, &default_raw_content())
}

/// Default content, except PRIMARY always rolls `minecraft:iron_ingot` and
/// SECONDARY draws only from `secondary_items`.
pub fn overlapping_raw_content(secondary_items: &[&str]) -> RawContent {
    let mut raw = default_raw_content();
    raw.item_pools.retain(|f| f.stem == "crafted" || f.stem == "smelted");
    raw.item_pools.push(pool("primary_only", &["minecraft:iron_ingot"]));
    raw.item_pools.push(pool("shared", secondary_items));
    for file in &mut raw.objective_templates {
        match file.doc.category {
            Category::Primary => file.doc.pool_refs = strings(&["primary_only"]),
            Category::Secondary => file.doc.pool_refs = strings(&["shared"]),
            Category::Task => {}
        }
    }
    raw
}

/// Deterministic definition for `(phase, slot)`.
pub fn definition(phase: Phase, slot: ObjectiveSlot, item: &str) -> ObjectiveDefinition {
    let category = slot.category();
    let action = category.allowed_actions()[0];
    ObjectiveDefinition {
        runtime_id: 1,
        phase,
        slot_key: slot,
        category,
        action,
        item_id: item.to_string(),
        quantity_required: 4,
        cohesion: None,
        provenance: Provenance {
            template_id: format!("{}_template", category.as_str().to_lowercase()),
            pool_id: "pool".to_string(),
            quantity_rule_id: format!("p{phase}_rule"),
            constraint_ids_applied: Vec::new(),
        },
    }
}

/// A RUNNING state in phase 1 with two teams, one assigned player and
/// seeded team objective states.
pub fn sample_run_state() -> RunState {
    let mut state = RunState {
        run_id: Some(Uuid::from_u128(0x5eed)),
        lifecycle_state: LifecycleState::Running,
        phase: 1,
        episode_number: 3,
        team_config: TeamConfig {
            enabled: true,
            count: 2,
            player_teams: [(Uuid::from_u128(0xa11ce), 1)].into_iter().collect(),
        },
        ..RunState::default()
    };
    let slots = state.objective_definitions.entry(1).or_default();
    for (slot, item) in [
        (ObjectiveSlot::Primary, "minecraft:iron_ingot"),
        (ObjectiveSlot::Secondary(1), "minecraft:oak_log"),
        (ObjectiveSlot::Secondary(2), "minecraft:coal"),
        (ObjectiveSlot::Task(1), "minecraft:glass"),
    ] {
        slots.insert(slot, definition(1, slot, item));
    }
    state.seed_team_objective_states();
    state
}

/// A temporary session root with valid content under `content/`.
pub struct TestSession {
    temp: TempDir,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_content(&default_raw_content())
    }

    pub fn with_content(raw: &RawContent) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        write_raw_content(&temp.path().join("content"), raw).expect("write content");
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn content_root(&self) -> PathBuf {
        self.root().join("content")
    }

    pub fn write_config(&self, config: &SessionConfig) {
        write_config(&self.root().join("config.toml"), config).expect("write config");
    }

    pub fn open(&self) -> Session {
        Session::open(self.root()).expect("open session")
    }
}

impl Default for TestSession {
    fn default() -> Self {
        Self::new()
    }
}
