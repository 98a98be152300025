//! Session configuration stored at `<root>/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Session configuration (TOML).
///
/// Hand-edited; every field is optional and falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the rule files, resolved against the session root
    /// when relative.
    pub content_root: PathBuf,

    /// Enables debug-only commands such as the objective listing.
    pub debug: bool,

    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct GenerationConfig {
    /// Re-roll candidates that would overlap items across tiers instead of
    /// only reporting the overlap after generation.
    pub reroll_tier_overlaps: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("content"),
            debug: false,
            generation: GenerationConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.content_root.as_os_str().is_empty() {
            return Err(anyhow!("content_root must not be empty"));
        }
        Ok(())
    }

    /// Content directory for a session rooted at `root`.
    pub fn resolve_content_root(&self, root: &Path) -> PathBuf {
        if self.content_root.is_absolute() {
            self.content_root.clone()
        } else {
            root.join(&self.content_root)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
