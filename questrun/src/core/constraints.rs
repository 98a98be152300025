//! Hard-constraint checks over one phase's generated objectives.
//!
//! Validation never mutates anything: it reports violations and leaves the
//! decision to the caller. Unknown rule types are skipped so content can carry
//! constraints this build does not understand yet.

use std::collections::{BTreeMap, BTreeSet};

use super::content::HardConstraintRule;
use super::generator::CandidateCheck;
use super::objective::ObjectiveDefinition;
use super::types::{Category, Phase};

/// Items may not repeat between PRIMARY and SECONDARY, nor between TASK and
/// either of them.
pub const NO_ITEM_OVERLAP_ACROSS_TIERS: &str = "no_item_overlap_across_tiers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule_id: String,
    pub message: String,
}

/// Item ids compare trimmed and case-folded.
fn normalize_item(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Run every enabled, recognized rule against `objectives`.
pub fn validate_phase(
    phase: Phase,
    rules: &[HardConstraintRule],
    objectives: &[&ObjectiveDefinition],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for rule in rules.iter().filter(|rule| rule.enabled) {
        if rule.kind == NO_ITEM_OVERLAP_ACROSS_TIERS {
            violations.extend(tier_overlaps(phase, &rule.id, objectives));
        }
    }
    violations
}

fn tiers_by_item(objectives: &[&ObjectiveDefinition]) -> BTreeMap<String, BTreeSet<Category>> {
    let mut tiers: BTreeMap<String, BTreeSet<Category>> = BTreeMap::new();
    for def in objectives {
        tiers
            .entry(normalize_item(&def.item_id))
            .or_default()
            .insert(def.category);
    }
    tiers
}

fn is_cross_tier(tiers: &BTreeSet<Category>) -> bool {
    let primary = tiers.contains(&Category::Primary);
    let secondary = tiers.contains(&Category::Secondary);
    let task = tiers.contains(&Category::Task);
    (primary && secondary) || (task && (primary || secondary))
}

fn tier_overlaps(phase: Phase, rule_id: &str, objectives: &[&ObjectiveDefinition]) -> Vec<Violation> {
    tiers_by_item(objectives)
        .into_iter()
        .filter(|(_, tiers)| is_cross_tier(tiers))
        .map(|(item, tiers)| {
            let names: Vec<&str> = tiers.iter().map(|tier| tier.as_str()).collect();
            Violation {
                rule_id: rule_id.to_string(),
                message: format!(
                    "phase {phase}: item '{item}' appears in multiple tiers ({})",
                    names.join(", ")
                ),
            }
        })
        .collect()
}

/// Rejects a candidate whose item would create a cross-tier overlap with the
/// objectives already accepted in its phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierOverlapGuard;

impl CandidateCheck for TierOverlapGuard {
    fn accepts(&self, candidate: &ObjectiveDefinition, accepted: &[ObjectiveDefinition]) -> bool {
        let item = normalize_item(&candidate.item_id);
        let mut tiers: BTreeSet<Category> = accepted
            .iter()
            .filter(|def| normalize_item(&def.item_id) == item)
            .map(|def| def.category)
            .collect();
        tiers.insert(candidate.category);
        !is_cross_tier(&tiers)
    }
}
