//! Reads a content root from disk: one JSON document per entity, each checked
//! against its embedded schema before deserialization. Cross-file rules are
//! enforced afterwards by [`build_snapshot`].

use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::{Validator, validator_for};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::content::{ContentError, ContentSnapshot, RawContent, SourceFile};
use crate::core::content_validate::build_snapshot;

pub const ITEM_POOLS_DIR: &str = "item_pools";
pub const OBJECTIVE_TEMPLATES_DIR: &str = "objective_templates";
pub const QUANTITY_RULES_DIR: &str = "quantity_rules";
pub const GENERATOR_RULES_DIR: &str = "generator_rules";
pub const CONSTRAINTS_DIR: &str = "constraints";

/// The five required subdirectories of a content root.
pub const CONTENT_DIRS: [&str; 5] = [
    ITEM_POOLS_DIR,
    OBJECTIVE_TEMPLATES_DIR,
    QUANTITY_RULES_DIR,
    GENERATOR_RULES_DIR,
    CONSTRAINTS_DIR,
];

const ITEM_POOL_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/content/item_pool.schema.json"
));
const OBJECTIVE_TEMPLATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/content/objective_template.schema.json"
));
const QUANTITY_RULE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/content/quantity_rule.schema.json"
));
const GENERATOR_RULE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/content/generator_rule.schema.json"
));
const CONSTRAINT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/content/constraint.schema.json"
));

/// Load and validate every rule file under `root`.
///
/// Either the whole root is valid and a snapshot comes back, or the first
/// problem is reported with its file and field.
pub fn load_content(root: &Path) -> Result<ContentSnapshot, ContentError> {
    debug!(root = %root.display(), "loading content");
    for dir in CONTENT_DIRS {
        let path = root.join(dir);
        if !path.is_dir() {
            return Err(ContentError::MissingDirectory(path));
        }
    }

    let raw = RawContent {
        item_pools: read_kind(root, ITEM_POOLS_DIR, "item pool", ITEM_POOL_SCHEMA)?,
        constraints: read_kind(root, CONSTRAINTS_DIR, "constraint", CONSTRAINT_SCHEMA)?,
        objective_templates: read_kind(
            root,
            OBJECTIVE_TEMPLATES_DIR,
            "objective template",
            OBJECTIVE_TEMPLATE_SCHEMA,
        )?,
        quantity_rules: read_kind(root, QUANTITY_RULES_DIR, "quantity rule", QUANTITY_RULE_SCHEMA)?,
        generator_rules: read_kind(
            root,
            GENERATOR_RULES_DIR,
            "generator rule",
            GENERATOR_RULE_SCHEMA,
        )?,
    };

    let snapshot = build_snapshot(raw)?;
    let summary = snapshot.summary();
    info!(
        root = %root.display(),
        item_pools = summary.item_pools,
        constraints = summary.constraints,
        objective_templates = summary.objective_templates,
        quantity_rules = summary.quantity_rules,
        generator_rules = summary.generator_rules,
        "content loaded"
    );
    Ok(snapshot)
}

fn compile_schema(kind: &'static str, source: &str) -> Result<Validator, ContentError> {
    let value: Value = serde_json::from_str(source).map_err(|err| ContentError::EmbeddedSchema {
        kind,
        reason: err.to_string(),
    })?;
    validator_for(&value).map_err(|err| ContentError::EmbeddedSchema {
        kind,
        reason: err.to_string(),
    })
}

/// `.json` files directly inside `dir`, sorted by name.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, ContentError> {
    let io_err = |source: std::io::Error| ContentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(ContentError::EmptyDirectory(dir.to_path_buf()));
    }
    Ok(files)
}

fn read_kind<T: DeserializeOwned>(
    root: &Path,
    dir: &str,
    kind: &'static str,
    schema: &str,
) -> Result<Vec<SourceFile<T>>, ContentError> {
    let validator = compile_schema(kind, schema)?;
    let files = json_files(&root.join(dir))?;
    debug!(kind, files = files.len(), "reading content files");
    files
        .into_iter()
        .map(|path| read_document(&validator, path))
        .collect()
}

fn read_document<T: DeserializeOwned>(
    validator: &Validator,
    path: PathBuf,
) -> Result<SourceFile<T>, ContentError> {
    let contents = fs::read_to_string(&path).map_err(|source| ContentError::Io {
        path: path.clone(),
        source,
    })?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|err| ContentError::malformed(&path, "$", format!("invalid JSON: {err}")))?;
    if !validator.is_valid(&value) {
        let messages = validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(ContentError::InvalidSchema {
            file: path,
            messages,
        });
    }
    let doc: T = serde_json::from_value(value)
        .map_err(|err| ContentError::malformed(&path, "$", err.to_string()))?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| ContentError::malformed(&path, "$", "filename is not valid UTF-8"))?
        .to_string();
    Ok(SourceFile { path, stem, doc })
}
