//! Session root layout and `questrun init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{SessionConfig, write_config};
use super::content_store::CONTENT_DIRS;

/// All canonical paths under a session root.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub run_state_path: PathBuf,
    pub run_state_tmp_path: PathBuf,
    pub run_state_backup_path: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join("state");
        Self {
            root: root.clone(),
            config_path: root.join("config.toml"),
            run_state_path: state_dir.join("run_state.json"),
            run_state_tmp_path: state_dir.join("run_state.json.tmp"),
            run_state_backup_path: state_dir.join("run_state.json.bak"),
            state_dir,
        }
    }
}

/// Options for `init_session`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing `config.toml`.
    pub force: bool,
}

/// Create the state directory, the content subdirectories and a default
/// `config.toml` under `root`.
///
/// Fails if `config.toml` already exists unless `options.force` is set.
/// Existing content and state files are never touched.
pub fn init_session(root: &Path, options: &InitOptions) -> Result<SessionPaths> {
    let paths = SessionPaths::new(root);
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "questrun init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    let config = SessionConfig::default();
    create_dir(&paths.state_dir)?;
    let content_root = config.resolve_content_root(root);
    for dir in CONTENT_DIRS {
        create_dir(&content_root.join(dir))?;
    }
    write_config(&paths.config_path, &config)?;

    info!(root = %root.display(), "session initialized");
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_layout_and_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_session(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.state_dir.is_dir());
        for dir in CONTENT_DIRS {
            assert!(temp.path().join("content").join(dir).is_dir(), "{dir}");
        }
        let cfg = load_config(&paths.config_path).expect("config");
        assert_eq!(cfg, SessionConfig::default());
        assert!(!paths.run_state_path.exists());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_session(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_session(temp.path(), &InitOptions { force: false }).expect_err("second init");
        assert!(err.to_string().contains("--force"));
        init_session(temp.path(), &InitOptions { force: true }).expect("forced init");
    }

    #[test]
    fn state_files_live_side_by_side() {
        let paths = SessionPaths::new("/srv/session");
        assert_eq!(paths.run_state_path, PathBuf::from("/srv/session/state/run_state.json"));
        assert_eq!(
            paths.run_state_tmp_path,
            PathBuf::from("/srv/session/state/run_state.json.tmp")
        );
        assert_eq!(
            paths.run_state_backup_path,
            PathBuf::from("/srv/session/state/run_state.json.bak")
        );
    }
}
