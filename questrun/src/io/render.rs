//! Plain-text rendering of session status and objective listings.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::constraints::Violation;
use crate::core::content::ContentSummary;
use crate::core::objective::ObjectiveDefinition;
use crate::core::slot::ObjectiveKey;
use crate::state::RunState;

const STATUS_TEMPLATE: &str = include_str!("templates/status.txt");
const OBJECTIVES_TEMPLATE: &str = include_str!("templates/objectives.txt");

#[derive(Debug, Clone, Serialize)]
struct ObjectiveRow {
    key: String,
    runtime_id: u32,
    headline: String,
    template_id: String,
    pool_id: String,
    quantity_rule_id: String,
    constraints: Vec<String>,
}

impl ObjectiveRow {
    fn from_definition(def: &ObjectiveDefinition) -> Self {
        let mut headline = format!(
            "{} {} {} x{}",
            def.category, def.action, def.item_id, def.quantity_required
        );
        if let Some(cohesion) = def.cohesion {
            headline.push_str(&format!(" [{cohesion}]"));
        }
        Self {
            key: ObjectiveKey::new(def.phase, def.slot_key).to_string(),
            runtime_id: def.runtime_id,
            headline,
            template_id: def.provenance.template_id.clone(),
            pool_id: def.provenance.pool_id.clone(),
            quantity_rule_id: def.provenance.quantity_rule_id.clone(),
            constraints: def.provenance.constraint_ids_applied.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ViolationRow {
    rule_id: String,
    message: String,
}

fn engine() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("status", STATUS_TEMPLATE)?;
    env.add_template("objectives", OBJECTIVES_TEMPLATE)?;
    Ok(env)
}

fn describe_teams(state: &RunState) -> String {
    let teams = &state.team_config;
    if !teams.enabled {
        return "disabled".to_string();
    }
    format!(
        "{} teams, {} players assigned",
        teams.count,
        teams.player_teams.len()
    )
}

/// Session summary; `content` and `violations` are shown when available.
pub fn render_status(
    state: &RunState,
    content: Option<ContentSummary>,
    violations: &[Violation],
) -> Result<String> {
    let env = engine()?;
    let template = env.get_template("status")?;
    let violations: Vec<ViolationRow> = violations
        .iter()
        .map(|v| ViolationRow {
            rule_id: v.rule_id.clone(),
            message: v.message.clone(),
        })
        .collect();
    let rendered = template.render(context! {
        run_id => state.run_id.map_or_else(|| "none".to_string(), |id| id.to_string()),
        lifecycle => state.lifecycle_state.as_str(),
        phase => state.phase,
        episode => state.episode_number,
        teams => describe_teams(state),
        objectives => crate::core::objective::objective_count(&state.objective_definitions),
        content => content,
        violations => violations,
    })?;
    Ok(rendered)
}

/// One entry per objective, in the order given.
pub fn render_objectives(objectives: &[&ObjectiveDefinition]) -> Result<String> {
    let env = engine()?;
    let template = env.get_template("objectives")?;
    let rows: Vec<ObjectiveRow> = objectives
        .iter()
        .map(|def| ObjectiveRow::from_definition(def))
        .collect();
    let rendered = template.render(context! { objectives => rows })?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::slot::ObjectiveSlot;
    use crate::core::types::{Cohesion, CohesionMode};
    use crate::test_support::{definition, sample_run_state};

    #[test]
    fn status_shows_lifecycle_and_counts() {
        let state = sample_run_state();
        let text = render_status(&state, None, &[]).expect("render");
        assert!(text.contains("lifecycle: RUNNING"), "{text}");
        assert!(text.contains("phase: 1"), "{text}");
        assert!(text.contains("teams: 2 teams, 1 players assigned"), "{text}");
        assert!(!text.contains("content:"), "{text}");
        assert!(!text.contains("warning:"), "{text}");
    }

    #[test]
    fn status_without_run_says_none() {
        let text = render_status(&RunState::default(), None, &[]).expect("render");
        assert!(text.starts_with("run: none\n"), "{text}");
        assert!(text.contains("teams: disabled"), "{text}");
    }

    #[test]
    fn status_lists_violations() {
        let violation = Violation {
            rule_id: "no_tier_overlap".to_string(),
            message: "phase 1: item 'minecraft:glass' appears in multiple tiers".to_string(),
        };
        let text = render_status(&RunState::default(), None, &[violation]).expect("render");
        assert!(text.contains("warning: [no_tier_overlap] phase 1"), "{text}");
    }

    #[test]
    fn listing_includes_cohesion_and_provenance() {
        let mut primary = definition(2, ObjectiveSlot::Primary, "minecraft:iron_ingot");
        primary.cohesion = Some(Cohesion {
            mode: CohesionMode::DeliveryChest,
            radius: 8,
        });
        let task = definition(2, ObjectiveSlot::Task(1), "minecraft:glass");
        let text = render_objectives(&[&primary, &task]).expect("render");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4, "{text}");
        assert!(lines[0].starts_with("2:PRIMARY"), "{text}");
        assert!(lines[0].contains("[DELIVERY_CHEST r=8]"), "{text}");
        assert!(lines[1].contains("template="), "{text}");
        assert!(lines[2].starts_with("2:TASK_1"), "{text}");
    }

    #[test]
    fn empty_listing_says_so() {
        let text = render_objectives(&[]).expect("render");
        assert_eq!(text.trim(), "no objectives generated");
    }
}
