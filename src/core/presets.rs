// src/core/presets.rs

//! Discovery of CMake configure presets.
//!
//! Only the subset of the preset format pipewright needs is understood:
//! `name`, `hidden`, `inherits`, `binaryDir`, `installDir` and the
//! `CMAKE_BUILD_TYPE` / `CMAKE_INSTALL_PREFIX` cache variables.

use crate::constants::{PRESETS_FILENAME, USER_PRESETS_FILENAME};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresetError {
    #[error("No preset file found at '{0}'.")]
    Missing(String),
    #[error("Could not read preset file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed preset file '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unknown preset '{name}'. Available presets: {available}")]
    UnknownPreset { name: String, available: String },
    #[error("Preset '{0}' inherits from itself through a cycle.")]
    InheritanceCycle(String),
}

/// A fully resolved configure preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: String,
    pub source_dir: PathBuf,
    pub binary_dir: PathBuf,
    pub install_dir: PathBuf,
    pub build_type: String,
}

#[derive(Deserialize, Debug, Default)]
struct PresetFile {
    #[serde(default, rename = "configurePresets")]
    configure_presets: Vec<RawPreset>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct RawPreset {
    name: String,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    inherits: Option<Inherits>,
    binary_dir: Option<String>,
    install_dir: Option<String>,
    #[serde(default)]
    cache_variables: HashMap<String, Value>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum Inherits {
    One(String),
    Many(Vec<String>),
}

impl Inherits {
    fn names(&self) -> Vec<&str> {
        match self {
            Inherits::One(name) => vec![name.as_str()],
            Inherits::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// The presets declared for a source tree.
#[derive(Debug)]
pub struct PresetCatalog {
    source_dir: PathBuf,
    raw: Vec<RawPreset>,
}

impl PresetCatalog {
    /// Reads `CMakePresets.json` and, when present, `CMakeUserPresets.json`.
    pub fn load(source_dir: &Path) -> Result<Self, PresetError> {
        let main = source_dir.join(PRESETS_FILENAME);
        let user = source_dir.join(USER_PRESETS_FILENAME);
        if !main.is_file() && !user.is_file() {
            return Err(PresetError::Missing(main.display().to_string()));
        }

        let mut raw = Vec::new();
        for path in [main, user] {
            if path.is_file() {
                raw.extend(read_preset_file(&path)?.configure_presets);
            }
        }
        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            raw,
        })
    }

    /// Names of presets that can be selected (non-hidden), in declaration order.
    pub fn visible_names(&self) -> Vec<String> {
        self.raw
            .iter()
            .filter(|p| !p.hidden)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn resolve(&self, name: &str) -> Result<Preset, PresetError> {
        let raw = self
            .raw
            .iter()
            .find(|p| p.name == name && !p.hidden)
            .ok_or_else(|| PresetError::UnknownPreset {
                name: name.to_string(),
                available: self.visible_names().join(", "),
            })?;

        let merged = self.flatten(raw, &mut HashSet::new())?;
        let build_type = merged
            .cache_variables
            .get("CMAKE_BUILD_TYPE")
            .and_then(cache_value)
            .unwrap_or_else(|| "Release".to_string());

        let binary_dir = merged
            .binary_dir
            .as_deref()
            .map(|dir| self.expand_dir(dir, name))
            .unwrap_or_else(|| self.source_dir.join("build").join(name));

        let install_dir = merged
            .install_dir
            .clone()
            .or_else(|| {
                merged
                    .cache_variables
                    .get("CMAKE_INSTALL_PREFIX")
                    .and_then(cache_value)
            })
            .map(|dir| self.expand_dir(&dir, name))
            .unwrap_or_else(|| self.source_dir.join("install"));

        Ok(Preset {
            name: name.to_string(),
            source_dir: self.source_dir.clone(),
            binary_dir,
            install_dir,
            build_type,
        })
    }

    /// Applies `inherits` recursively. Fields set on a preset win over its
    /// parents; earlier parents win over later ones.
    fn flatten(&self, preset: &RawPreset, visiting: &mut HashSet<String>) -> Result<RawPreset, PresetError> {
        if !visiting.insert(preset.name.clone()) {
            return Err(PresetError::InheritanceCycle(preset.name.clone()));
        }

        let mut merged = preset.clone();
        if let Some(inherits) = &preset.inherits {
            for parent_name in inherits.names() {
                let Some(parent) = self.raw.iter().find(|p| p.name == parent_name) else {
                    log::warn!(
                        "Preset '{}' inherits from unknown preset '{}'",
                        preset.name,
                        parent_name
                    );
                    continue;
                };
                let parent = self.flatten(parent, visiting)?;
                if merged.binary_dir.is_none() {
                    merged.binary_dir = parent.binary_dir;
                }
                if merged.install_dir.is_none() {
                    merged.install_dir = parent.install_dir;
                }
                for (key, value) in parent.cache_variables {
                    merged.cache_variables.entry(key).or_insert(value);
                }
            }
        }

        visiting.remove(&preset.name);
        Ok(merged)
    }

    fn expand_dir(&self, template: &str, preset_name: &str) -> PathBuf {
        let source = self.source_dir.to_string_lossy();
        let parent = self
            .source_dir
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir_name = self
            .source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut expanded = template
            .replace("${sourceDir}", &source)
            .replace("${sourceParentDir}", &parent)
            .replace("${sourceDirName}", &dir_name)
            .replace("${presetName}", preset_name);
        expanded = expand_env_macros(&expanded);

        crate::system::executor::resolve_against(&self.source_dir, Path::new(&expanded))
    }
}

fn read_preset_file(path: &Path) -> Result<PresetFile, PresetError> {
    let content = fs::read_to_string(path).map_err(|source| PresetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| PresetError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// A cache variable is either a plain string or `{ "type": ..., "value": ... }`.
fn cache_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "ON" } else { "OFF" }.to_string()),
        Value::Object(map) => map.get("value").and_then(cache_value),
        _ => None,
    }
}

/// Replaces `$env{NAME}` with the value of `NAME` (empty when unset).
fn expand_env_macros(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("$env{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 5..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&std::env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
