//! Content model: the rule files a run is generated from.
//!
//! File-facing structs mirror the JSON documents one-to-one. A
//! [`ContentSnapshot`] is the validated, indexed, immutable view built from them
//! by [`crate::core::content_validate::build_snapshot`]; callers never see a
//! partially validated snapshot.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::types::{Action, Category, Cohesion, CohesionMode, Phase, RollMode};

/// Constraint `type` that attaches a cohesion requirement to a template.
pub const COHESION_CONSTRAINT_TYPE: &str = "cohesion";
/// Id prefix reserved for cohesion constraints.
pub const COHESION_ID_PREFIX: &str = "cohesion_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPool {
    pub id: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveTemplate {
    #[serde(alias = "template_id")]
    pub id: String,
    pub category: Category,
    #[serde(rename = "type")]
    pub action: Action,
    pub pool_refs: Vec<String>,
    pub pick: PickRange,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityRule {
    #[serde(alias = "rule_id")]
    pub id: String,
    pub phase: Phase,
    pub category: Category,
    #[serde(rename = "type")]
    pub action: Action,
    pub roll_mode: RollMode,
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl QuantityRule {
    /// Number of distinct values the rule can roll.
    pub fn steps(&self) -> u32 {
        (self.max - self.min) / self.step + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRule {
    pub count: u8,
    #[serde(default)]
    pub eligible_templates: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRule {
    pub count: CountRange,
    #[serde(default)]
    pub eligible_templates: Vec<String>,
    pub cap_per_team: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub retry_budget_total: u32,
    pub retry_budget_per_slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorPhaseRule {
    pub phase: Phase,
    pub primary: SlotRule,
    pub secondary: SlotRule,
    pub tasks: TaskRule,
    pub generation: RetryBudget,
}

/// A constraint document. Only the fields the engine understands are read;
/// anything else in the file is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CohesionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
}

fn enabled_by_default() -> bool {
    true
}

/// Indexed constraint, keyed by the file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintEntry {
    pub id: String,
    pub kind: Option<String>,
    pub enabled: bool,
    pub cohesion: Option<Cohesion>,
}

/// A typed constraint evaluated against generated objectives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardConstraintRule {
    pub id: String,
    pub kind: String,
    pub enabled: bool,
}

/// One parsed document and where it came from.
#[derive(Debug, Clone)]
pub struct SourceFile<T> {
    pub path: PathBuf,
    pub stem: String,
    pub doc: T,
}

/// Everything read from a content root, before cross-file validation.
#[derive(Debug, Clone, Default)]
pub struct RawContent {
    pub item_pools: Vec<SourceFile<ItemPool>>,
    pub constraints: Vec<SourceFile<ConstraintFile>>,
    pub objective_templates: Vec<SourceFile<ObjectiveTemplate>>,
    pub quantity_rules: Vec<SourceFile<QuantityRule>>,
    pub generator_rules: Vec<SourceFile<GeneratorPhaseRule>>,
}

/// Validated, indexed, read-only content.
#[derive(Debug, Clone, Default)]
pub struct ContentSnapshot {
    pub(crate) pools: BTreeMap<String, ItemPool>,
    pub(crate) constraints: BTreeMap<String, ConstraintEntry>,
    pub(crate) templates: BTreeMap<String, ObjectiveTemplate>,
    pub(crate) quantity_rules: BTreeMap<(Phase, Category, Action), QuantityRule>,
    pub(crate) generator_rules: BTreeMap<Phase, GeneratorPhaseRule>,
}

/// Entity counts, for status output and load logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentSummary {
    pub item_pools: usize,
    pub constraints: usize,
    pub objective_templates: usize,
    pub quantity_rules: usize,
    pub generator_rules: usize,
}

impl ContentSnapshot {
    pub fn pool(&self, id: &str) -> Option<&ItemPool> {
        self.pools.get(id)
    }

    pub fn template(&self, id: &str) -> Option<&ObjectiveTemplate> {
        self.templates.get(id)
    }

    pub fn quantity_rule_for(
        &self,
        phase: Phase,
        category: Category,
        action: Action,
    ) -> Option<&QuantityRule> {
        self.quantity_rules.get(&(phase, category, action))
    }

    pub fn phase_rule(&self, phase: Phase) -> Option<&GeneratorPhaseRule> {
        self.generator_rules.get(&phase)
    }

    /// Every constraint that declares a `type`, enabled or not.
    pub fn hard_constraint_rules(&self) -> Vec<HardConstraintRule> {
        self.constraints
            .values()
            .filter_map(|entry| {
                entry.kind.as_ref().map(|kind| HardConstraintRule {
                    id: entry.id.clone(),
                    kind: kind.clone(),
                    enabled: entry.enabled,
                })
            })
            .collect()
    }

    pub fn enabled_rules(&self) -> Vec<HardConstraintRule> {
        self.hard_constraint_rules()
            .into_iter()
            .filter(|rule| rule.enabled)
            .collect()
    }

    /// Cohesion requirement carried by a template, if it references an
    /// enabled one.
    pub fn cohesion_for(&self, template: &ObjectiveTemplate) -> Option<Cohesion> {
        template
            .constraints
            .iter()
            .filter_map(|id| self.constraints.get(id))
            .filter(|entry| entry.enabled)
            .find_map(|entry| entry.cohesion)
    }

    pub fn summary(&self) -> ContentSummary {
        ContentSummary {
            item_pools: self.pools.len(),
            constraints: self.constraints.len(),
            objective_templates: self.templates.len(),
            quantity_rules: self.quantity_rules.len(),
            generator_rules: self.generator_rules.len(),
        }
    }
}

/// Why a content root could not be loaded. Every variant names the file (or
/// the directory) and, where applicable, the offending field.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content directory missing: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("content directory has no .json files: {}", .0.display())]
    EmptyDirectory(PathBuf),
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: schema validation failed: {}", file.display(), messages.join("; "))]
    InvalidSchema {
        file: PathBuf,
        messages: Vec<String>,
    },
    #[error("{}: field `{field}`: {reason}", file.display())]
    MalformedFile {
        file: PathBuf,
        field: String,
        reason: String,
    },
    #[error("{}: duplicate {kind} id '{id}' (already declared in {})", file.display(), first.display())]
    DuplicateId {
        file: PathBuf,
        kind: &'static str,
        id: String,
        first: PathBuf,
    },
    #[error("{}: field `{field}` references unknown {kind} '{id}'", file.display())]
    MissingReference {
        file: PathBuf,
        field: String,
        kind: &'static str,
        id: String,
    },
    #[error("quantity rules: phase {phase} has no rule for {category}/{action}")]
    MissingCoverage {
        phase: Phase,
        category: Category,
        action: Action,
    },
    #[error("generator rules: no rule for phase {0} (expected phase{0}.json)")]
    MissingGeneratorPhase(Phase),
    #[error("embedded {kind} schema is invalid: {reason}")]
    EmbeddedSchema { kind: &'static str, reason: String },
}

impl ContentError {
    pub(crate) fn malformed(
        file: &std::path::Path,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ContentError::MalformedFile {
            file: file.to_path_buf(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
