//! Cross-file validation that turns [`RawContent`] into a [`ContentSnapshot`].
//!
//! Runs in a fixed order (pools, constraints, templates, quantity rules,
//! generator rules) so that each stage can rely on the indexes built by the
//! stages before it. The first violation aborts the build.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::content::{
    COHESION_CONSTRAINT_TYPE, COHESION_ID_PREFIX, ConstraintEntry, ConstraintFile, ContentError,
    ContentSnapshot, GeneratorPhaseRule, ItemPool, ObjectiveTemplate, QuantityRule, RawContent, SlotRule,
    SourceFile,
};
use super::slot::MAX_SLOT_INDEX;
use super::types::{
    Action, Category, Cohesion, LAST_PHASE, PHASES, Phase, REQUIRED_QUANTITY_PAIRS,
};

/// Exact `namespace:name` item id: no whitespace, no `#` tag marker.
static ITEM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s#:]+:[^\s#]+$").expect("item id regex"));

/// Secondary slots in phases 1-4.
const SECONDARY_COUNT: u8 = 2;

pub fn is_valid_item_id(id: &str) -> bool {
    ITEM_ID_RE.is_match(id)
}

/// Validate all content and index it. Nothing is returned unless every file passes.
pub fn build_snapshot(raw: RawContent) -> Result<ContentSnapshot, ContentError> {
    let pools = index_pools(raw.item_pools)?;
    let constraints = index_constraints(raw.constraints)?;
    let templates = index_templates(raw.objective_templates, &pools, &constraints)?;
    let quantity_rules = index_quantity_rules(raw.quantity_rules)?;
    let generator_rules = index_generator_rules(raw.generator_rules, &templates)?;

    Ok(ContentSnapshot {
        pools: pools.into_iter().map(|(id, (_, pool))| (id, pool)).collect(),
        constraints,
        templates: templates.into_iter().map(|(id, (_, t))| (id, t)).collect(),
        quantity_rules,
        generator_rules,
    })
}

fn check_id_matches_stem(path: &Path, field: &str, id: &str, stem: &str) -> Result<(), ContentError> {
    if id.trim().is_empty() {
        return Err(ContentError::malformed(path, field, "must not be empty"));
    }
    if id != stem {
        return Err(ContentError::malformed(
            path,
            field,
            format!("id '{id}' does not match filename stem '{stem}'"),
        ));
    }
    Ok(())
}

/// `first` is where `id` was already declared, if anywhere.
fn check_unique(
    first: Option<&Path>,
    kind: &'static str,
    id: &str,
    path: &Path,
) -> Result<(), ContentError> {
    if let Some(first) = first {
        return Err(ContentError::DuplicateId {
            file: path.to_path_buf(),
            kind,
            id: id.to_string(),
            first: first.to_path_buf(),
        });
    }
    Ok(())
}

fn index_pools(
    files: Vec<SourceFile<ItemPool>>,
) -> Result<BTreeMap<String, (PathBuf, ItemPool)>, ContentError> {
    let mut index: BTreeMap<String, (PathBuf, ItemPool)> = BTreeMap::new();
    for file in files {
        let pool = file.doc;
        check_id_matches_stem(&file.path, "id", &pool.id, &file.stem)?;
        let first = index.get(&pool.id).map(|(first, _)| first.as_path());
        check_unique(first, "item pool", &pool.id, &file.path)?;
        if pool.items.is_empty() {
            return Err(ContentError::malformed(&file.path, "items", "must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for (i, item) in pool.items.iter().enumerate() {
            if !is_valid_item_id(item) {
                return Err(ContentError::malformed(
                    &file.path,
                    format!("items[{i}]"),
                    format!("'{item}' is not an exact namespace:name item id"),
                ));
            }
            if !seen.insert(item.as_str()) {
                return Err(ContentError::malformed(
                    &file.path,
                    format!("items[{i}]"),
                    format!("duplicate item '{item}'"),
                ));
            }
        }
        index.insert(pool.id.clone(), (file.path, pool));
    }
    Ok(index)
}

fn index_constraints(
    files: Vec<SourceFile<ConstraintFile>>,
) -> Result<BTreeMap<String, ConstraintEntry>, ContentError> {
    let mut index = BTreeMap::new();
    for file in files {
        let doc = file.doc;
        if let Some(id) = &doc.id {
            check_id_matches_stem(&file.path, "id", id, &file.stem)?;
        }
        let cohesion = if doc.kind.as_deref() == Some(COHESION_CONSTRAINT_TYPE) {
            let mode = doc.mode.ok_or_else(|| {
                ContentError::malformed(&file.path, "mode", "cohesion constraint needs a mode")
            })?;
            let radius = match doc.radius {
                Some(radius) if radius >= 1 => radius,
                _ => {
                    return Err(ContentError::malformed(
                        &file.path,
                        "radius",
                        "cohesion constraint needs a radius >= 1",
                    ));
                }
            };
            Some(Cohesion { mode, radius })
        } else {
            None
        };
        index.insert(
            file.stem.clone(),
            ConstraintEntry {
                id: file.stem,
                kind: doc.kind,
                enabled: doc.enabled,
                cohesion,
            },
        );
    }
    Ok(index)
}

fn is_cohesion_constraint(entry: &ConstraintEntry) -> bool {
    entry.cohesion.is_some() || entry.id.starts_with(COHESION_ID_PREFIX)
}

fn index_templates(
    files: Vec<SourceFile<ObjectiveTemplate>>,
    pools: &BTreeMap<String, (PathBuf, ItemPool)>,
    constraints: &BTreeMap<String, ConstraintEntry>,
) -> Result<BTreeMap<String, (PathBuf, ObjectiveTemplate)>, ContentError> {
    let mut index: BTreeMap<String, (PathBuf, ObjectiveTemplate)> = BTreeMap::new();
    for file in files {
        let template = file.doc;
        let path = &file.path;
        check_id_matches_stem(path, "id", &template.id, &file.stem)?;
        let first = index.get(&template.id).map(|(first, _)| first.as_path());
        check_unique(first, "objective template", &template.id, path)?;

        if !template.category.allows(template.action) {
            return Err(ContentError::malformed(
                path,
                "type",
                format!(
                    "{} is not allowed for category {}",
                    template.action, template.category
                ),
            ));
        }

        if template.pool_refs.is_empty() {
            return Err(ContentError::malformed(path, "pool_refs", "must not be empty"));
        }
        for pool_id in &template.pool_refs {
            if !pools.contains_key(pool_id) {
                return Err(ContentError::MissingReference {
                    file: path.clone(),
                    field: "pool_refs".to_string(),
                    kind: "item pool",
                    id: pool_id.clone(),
                });
            }
        }

        if template.pick.min < 1 || template.pick.min > template.pick.max {
            return Err(ContentError::malformed(
                path,
                "pick",
                format!(
                    "invalid range {}..{} (need 1 <= min <= max)",
                    template.pick.min, template.pick.max
                ),
            ));
        }

        let mut cohesion_refs = 0;
        for constraint_id in &template.constraints {
            let entry = constraints.get(constraint_id).ok_or_else(|| {
                ContentError::MissingReference {
                    file: path.clone(),
                    field: "constraints".to_string(),
                    kind: "constraint",
                    id: constraint_id.clone(),
                }
            })?;
            if is_cohesion_constraint(entry) {
                if template.category == Category::Task {
                    return Err(ContentError::malformed(
                        path,
                        "constraints",
                        format!("TASK templates cannot carry cohesion constraint '{constraint_id}'"),
                    ));
                }
                cohesion_refs += 1;
            }
        }
        if cohesion_refs > 1 {
            return Err(ContentError::malformed(
                path,
                "constraints",
                "at most one cohesion constraint per template",
            ));
        }

        index.insert(template.id.clone(), (file.path, template));
    }
    Ok(index)
}

fn index_quantity_rules(
    files: Vec<SourceFile<QuantityRule>>,
) -> Result<BTreeMap<(Phase, Category, Action), QuantityRule>, ContentError> {
    let mut by_id: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut index: BTreeMap<(Phase, Category, Action), QuantityRule> = BTreeMap::new();
    for file in files {
        let rule = file.doc;
        let path = &file.path;
        check_id_matches_stem(path, "id", &rule.id, &file.stem)?;
        check_unique(by_id.get(&rule.id).map(PathBuf::as_path), "quantity rule", &rule.id, path)?;

        if !PHASES.contains(&rule.phase) {
            return Err(ContentError::malformed(
                path,
                "phase",
                format!("{} is outside {}..={}", rule.phase, PHASES.start(), PHASES.end()),
            ));
        }
        if !rule.category.allows(rule.action) {
            return Err(ContentError::malformed(
                path,
                "type",
                format!("{} is not allowed for category {}", rule.action, rule.category),
            ));
        }
        if rule.min < 1 || rule.min > rule.max {
            return Err(ContentError::malformed(
                path,
                "min",
                format!("invalid range {}..{} (need 1 <= min <= max)", rule.min, rule.max),
            ));
        }
        if rule.step < 1 {
            return Err(ContentError::malformed(path, "step", "must be >= 1"));
        }
        if (rule.max - rule.min) % rule.step != 0 {
            return Err(ContentError::malformed(
                path,
                "step",
                format!(
                    "range {}..{} is not divisible by step {}",
                    rule.min, rule.max, rule.step
                ),
            ));
        }

        let key = (rule.phase, rule.category, rule.action);
        if let Some(existing) = index.get(&key) {
            return Err(ContentError::malformed(
                path,
                "type",
                format!(
                    "phase {} already has a {}/{} rule ('{}')",
                    rule.phase, rule.category, rule.action, existing.id
                ),
            ));
        }
        by_id.insert(rule.id.clone(), file.path.clone());
        index.insert(key, rule);
    }

    for phase in PHASES {
        for (category, action) in REQUIRED_QUANTITY_PAIRS {
            if !index.contains_key(&(phase, category, action)) {
                return Err(ContentError::MissingCoverage {
                    phase,
                    category,
                    action,
                });
            }
        }
    }
    Ok(index)
}

/// Accepts `phase3` and `3`.
fn phase_from_stem(stem: &str) -> Option<Phase> {
    let digits = stem.strip_prefix("phase").unwrap_or(stem);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn check_eligible(
    path: &Path,
    block: &str,
    tier: Category,
    eligible: &[String],
    templates: &BTreeMap<String, (PathBuf, ObjectiveTemplate)>,
) -> Result<(), ContentError> {
    let field = format!("{block}.eligible_templates");
    if eligible.is_empty() {
        return Err(ContentError::malformed(path, field, "must not be empty"));
    }
    for id in eligible {
        let Some((_, template)) = templates.get(id) else {
            return Err(ContentError::MissingReference {
                file: path.to_path_buf(),
                field,
                kind: "objective template",
                id: id.clone(),
            });
        };
        if template.category != tier {
            return Err(ContentError::malformed(
                path,
                field,
                format!("template '{id}' is {} but this block needs {tier}", template.category),
            ));
        }
    }
    Ok(())
}

fn check_slot_rule(
    path: &Path,
    block: &str,
    rule: &SlotRule,
    expected_count: u8,
) -> Result<(), ContentError> {
    if rule.count != expected_count {
        return Err(ContentError::malformed(
            path,
            format!("{block}.count"),
            format!("must be {expected_count} (found {})", rule.count),
        ));
    }
    Ok(())
}

fn index_generator_rules(
    files: Vec<SourceFile<GeneratorPhaseRule>>,
    templates: &BTreeMap<String, (PathBuf, ObjectiveTemplate)>,
) -> Result<BTreeMap<Phase, GeneratorPhaseRule>, ContentError> {
    let mut index: BTreeMap<Phase, (PathBuf, GeneratorPhaseRule)> = BTreeMap::new();
    for file in files {
        let rule = file.doc;
        let path = &file.path;
        let Some(expected_phase) = phase_from_stem(&file.stem) else {
            return Err(ContentError::malformed(
                path,
                "phase",
                format!("filename '{}' is not phase<N>.json", file.stem),
            ));
        };
        if rule.phase != expected_phase {
            return Err(ContentError::malformed(
                path,
                "phase",
                format!("expected {expected_phase} from filename, found {}", rule.phase),
            ));
        }
        if !PHASES.contains(&rule.phase) {
            return Err(ContentError::malformed(
                path,
                "phase",
                format!("{} is outside {}..={}", rule.phase, PHASES.start(), PHASES.end()),
            ));
        }

        check_slot_rule(path, "primary", &rule.primary, 1)?;
        check_eligible(path, "primary", Category::Primary, &rule.primary.eligible_templates, templates)?;

        if rule.phase == LAST_PHASE {
            check_slot_rule(path, "secondary", &rule.secondary, 0)?;
            if !rule.secondary.eligible_templates.is_empty() {
                return Err(ContentError::malformed(
                    path,
                    "secondary.eligible_templates",
                    format!("must be empty in phase {LAST_PHASE}"),
                ));
            }
            let tasks = &rule.tasks;
            if tasks.count.min != 0 || tasks.count.max != 0 {
                return Err(ContentError::malformed(
                    path,
                    "tasks.count",
                    format!("must be 0..0 in phase {LAST_PHASE}"),
                ));
            }
            if tasks.cap_per_team != 0 {
                return Err(ContentError::malformed(
                    path,
                    "tasks.cap_per_team",
                    format!("must be 0 in phase {LAST_PHASE}"),
                ));
            }
            if !tasks.eligible_templates.is_empty() {
                return Err(ContentError::malformed(
                    path,
                    "tasks.eligible_templates",
                    format!("must be empty in phase {LAST_PHASE}"),
                ));
            }
        } else {
            check_slot_rule(path, "secondary", &rule.secondary, SECONDARY_COUNT)?;
            check_eligible(
                path,
                "secondary",
                Category::Secondary,
                &rule.secondary.eligible_templates,
                templates,
            )?;
            let count = rule.tasks.count;
            if count.min > count.max || count.max > MAX_SLOT_INDEX {
                return Err(ContentError::malformed(
                    path,
                    "tasks.count",
                    format!(
                        "invalid range {}..{} (need min <= max <= {MAX_SLOT_INDEX})",
                        count.min, count.max
                    ),
                ));
            }
            check_eligible(path, "tasks", Category::Task, &rule.tasks.eligible_templates, templates)?;
        }

        let budget = rule.generation;
        if budget.retry_budget_total < 1 {
            return Err(ContentError::malformed(
                path,
                "generation.retry_budget_total",
                "must be >= 1",
            ));
        }
        if budget.retry_budget_per_slot < 1 || budget.retry_budget_per_slot > budget.retry_budget_total {
            return Err(ContentError::malformed(
                path,
                "generation.retry_budget_per_slot",
                format!(
                    "must be within 1..={} (found {})",
                    budget.retry_budget_total, budget.retry_budget_per_slot
                ),
            ));
        }

        if let Some((first, _)) = index.get(&rule.phase) {
            return Err(ContentError::DuplicateId {
                file: path.clone(),
                kind: "generator rule",
                id: format!("phase{}", rule.phase),
                first: first.clone(),
            });
        }
        index.insert(rule.phase, (file.path, rule));
    }

    for phase in PHASES {
        if !index.contains_key(&phase) {
            return Err(ContentError::MissingGeneratorPhase(phase));
        }
    }
    Ok(index.into_iter().map(|(phase, (_, rule))| (phase, rule)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_raw_content;

    #[test]
    fn default_content_builds() {
        let snapshot = build_snapshot(default_raw_content()).expect("snapshot");
        let summary = snapshot.summary();
        assert_eq!(summary.quantity_rules, 25);
        assert_eq!(summary.generator_rules, 5);
        assert!(snapshot.quantity_rule_for(3, Category::Task, Action::Smelt).is_some());
    }

    #[test]
    fn item_ids_must_be_exact() {
        assert!(is_valid_item_id("minecraft:oak_log"));
        assert!(is_valid_item_id("mod:sub:thing"));
        for bad in ["oak_log", ":oak_log", "minecraft:", "#minecraft:logs", "minecraft:oak log"] {
            assert!(!is_valid_item_id(bad), "accepted {bad}");
        }
    }

    /// Removing one of the five required (category, action) rules for a phase fails the build.
    #[test]
    fn missing_task_smelt_rule_for_phase_three_fails() {
        let mut raw = default_raw_content();
        raw.quantity_rules
            .retain(|f| !(f.doc.phase == 3 && f.doc.category == Category::Task && f.doc.action == Action::Smelt));
        let err = build_snapshot(raw).expect_err("coverage gap");
        assert!(matches!(
            err,
            ContentError::MissingCoverage {
                phase: 3,
                category: Category::Task,
                action: Action::Smelt
            }
        ));
    }

    #[test]
    fn template_with_unknown_pool_is_rejected() {
        let mut raw = default_raw_content();
        raw.objective_templates[0].doc.pool_refs.push("no_such_pool".to_string());
        let err = build_snapshot(raw).expect_err("missing ref");
        match err {
            ContentError::MissingReference { field, id, .. } => {
                assert_eq!(field, "pool_refs");
                assert_eq!(id, "no_such_pool");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn task_template_cannot_reference_cohesion() {
        let mut raw = default_raw_content();
        let task = raw
            .objective_templates
            .iter_mut()
            .find(|f| f.doc.category == Category::Task)
            .expect("task template");
        task.doc.constraints.push("cohesion_delivery_chest".to_string());
        let err = build_snapshot(raw).expect_err("task cohesion");
        assert!(err.to_string().contains("cohesion"), "{err}");
    }

    #[test]
    fn id_must_match_filename_stem() {
        let mut raw = default_raw_content();
        raw.item_pools[0].stem = "renamed".to_string();
        let err = build_snapshot(raw).expect_err("stem mismatch");
        assert!(matches!(err, ContentError::MalformedFile { ref field, .. } if field == "id"));
    }

    #[test]
    fn duplicate_quantity_rule_id_names_the_first_file() {
        let mut raw = default_raw_content();
        let mut copy = raw.quantity_rules[0].clone();
        copy.path = PathBuf::from("quantity_rules/elsewhere/p1_primary_deliver.json");
        raw.quantity_rules.push(copy);
        let err = build_snapshot(raw).expect_err("duplicate");
        match err {
            ContentError::DuplicateId { kind, id, first, .. } => {
                assert_eq!(kind, "quantity rule");
                assert_eq!(id, "p1_primary_deliver");
                assert_eq!(first, PathBuf::from("quantity_rules/p1_primary_deliver.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn disabled_cohesion_constraint_attaches_nothing() {
        let snapshot = build_snapshot(default_raw_content()).expect("snapshot");
        let primary = snapshot.template("primary_deliver").expect("template");
        assert!(snapshot.cohesion_for(primary).is_some());

        let mut raw = default_raw_content();
        let cohesion = raw
            .constraints
            .iter_mut()
            .find(|f| f.stem == "cohesion_delivery_chest")
            .expect("cohesion constraint");
        cohesion.doc.enabled = false;
        let snapshot = build_snapshot(raw).expect("snapshot");
        let primary = snapshot.template("primary_deliver").expect("template");
        assert!(snapshot.cohesion_for(primary).is_none());
    }

    #[test]
    fn indivisible_quantity_range_is_rejected() {
        let mut raw = default_raw_content();
        let rule = &mut raw.quantity_rules[0].doc;
        rule.min = 1;
        rule.max = 10;
        rule.step = 4;
        let err = build_snapshot(raw).expect_err("step");
        assert!(matches!(err, ContentError::MalformedFile { ref field, .. } if field == "step"));
    }

    #[test]
    fn last_phase_must_have_no_secondaries() {
        let mut raw = default_raw_content();
        let last = raw
            .generator_rules
            .iter_mut()
            .find(|f| f.doc.phase == LAST_PHASE)
            .expect("phase 5");
        last.doc.secondary.count = 2;
        let err = build_snapshot(raw).expect_err("locked constant");
        assert!(
            matches!(err, ContentError::MalformedFile { ref field, .. } if field == "secondary.count")
        );
    }

    #[test]
    fn per_slot_budget_cannot_exceed_total() {
        let mut raw = default_raw_content();
        let budget = &mut raw.generator_rules[0].doc.generation;
        budget.retry_budget_total = 2;
        budget.retry_budget_per_slot = 3;
        let err = build_snapshot(raw).expect_err("budget");
        assert!(err.to_string().contains("retry_budget_per_slot"), "{err}");
    }

    #[test]
    fn every_phase_needs_a_generator_rule() {
        let mut raw = default_raw_content();
        raw.generator_rules.retain(|f| f.doc.phase != 4);
        let err = build_snapshot(raw).expect_err("phase 4");
        assert!(matches!(err, ContentError::MissingGeneratorPhase(4)));
    }

    #[test]
    fn phase_stem_accepts_both_spellings() {
        assert_eq!(phase_from_stem("phase2"), Some(2));
        assert_eq!(phase_from_stem("2"), Some(2));
        assert_eq!(phase_from_stem("phase"), None);
        assert_eq!(phase_from_stem("two"), None);
    }
}
