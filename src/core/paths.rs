// src/core/paths.rs

use crate::constants::{CONTEXT_FILENAME, PRESETS_FILENAME, STATE_DIR, USER_SETTINGS_FILENAME};
use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref USER_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
}

/// Returns the path to the pipewright user configuration directory
/// (`~/.config/pipewright` on Linux). The directory is not created.
///
/// This function is memoized: the first call computes and caches the path.
pub fn get_user_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = USER_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join("pipewright");
    *cached = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to the user-level settings file.
pub fn get_user_settings_path() -> Result<PathBuf, PathError> {
    get_user_config_dir().map(|dir| dir.join(USER_SETTINGS_FILENAME))
}

/// Walks up from `start` looking for a directory that already holds pipewright
/// state or a `CMakePresets.json`. Falls back to `start` itself.
pub fn find_project_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(STATE_DIR).is_dir() || dir.join(PRESETS_FILENAME).is_file())
        .unwrap_or(start)
        .to_path_buf()
}

/// The persisted context location for a project root.
pub fn context_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(CONTEXT_FILENAME)
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a configured
/// command or path.
pub fn expand_template(template: &str) -> Result<String> {
    shellexpand::full(template)
        .map(|expanded| expanded.into_owned())
        .map_err(|e| anyhow!("Failed to expand '{}': {}", template, e))
}
