// src/core/settings.rs

//! Layered configuration.
//!
//! Settings are resolved from three layers, later layers winning key by key:
//! built-in defaults, the user file (`~/.config/pipewright/config.toml`) and
//! the project file (`<root>/pipewright.toml`).

use crate::{
    constants::PROJECT_SETTINGS_FILENAME,
    core::{paths, toolchain_options},
    models::{OptionValue, ToolchainOption},
    system::shells_config::CaptureShell,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid settings: {0}")]
    Invalid(#[source] toml::de::Error),
    #[error("Invalid activation error pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Programs used for each external step.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub generator: String,
    pub dependency_manager: String,
    pub dependency_args: Vec<String>,
    pub test_runner: String,
    pub coverage: String,
    pub coverage_args: Vec<String>,
    pub packager: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            generator: "cmake".to_string(),
            dependency_manager: "conan".to_string(),
            dependency_args: vec!["--build=missing".to_string()],
            test_runner: "ctest".to_string(),
            coverage: "gcovr".to_string(),
            coverage_args: Vec::new(),
            packager: "cpack".to_string(),
        }
    }
}

/// How toolchain environments are activated.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ActivationConfig {
    /// A command that sets up the compiler toolchain, e.g. a `vcvarsall.bat x64` invocation.
    pub toolchain_setup: Option<String>,
    /// Base name of the build-time activation script generated by the dependency manager.
    pub build_script: String,
    /// Base name of the run-time activation script.
    pub run_script: String,
    /// Lines of activation output matching this pattern fail the activation.
    pub error_pattern: Option<String>,
    /// The toolchain option that turns on coverage instrumentation.
    pub coverage_option: String,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            toolchain_setup: None,
            build_script: "conanbuild".to_string(),
            run_script: "conanrun".to_string(),
            error_pattern: Some(r"^\[ERROR".to_string()),
            coverage_option: "ENABLE_COVERAGE".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolsConfig,
    pub activation: ActivationConfig,
    /// Overrides the platform's default capture shell.
    pub shell: Option<CaptureShell>,
    /// Toolchain options seeded into a project at setup.
    pub options: BTreeMap<String, OptionValue>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert("ENABLE_COVERAGE".to_string(), OptionValue::Bool(false));
        Self {
            tools: ToolsConfig::default(),
            activation: ActivationConfig::default(),
            shell: None,
            options,
        }
    }
}

impl Settings {
    /// Loads the user and project layers on top of the defaults.
    pub fn load(project_root: &Path) -> Result<Self, SettingsError> {
        let mut layers = Vec::new();
        match paths::get_user_settings_path() {
            Ok(path) => layers.push(path),
            Err(e) => log::debug!("Skipping user settings: {}", e),
        }
        layers.push(project_root.join(PROJECT_SETTINGS_FILENAME));
        Self::load_layers(&layers)
    }

    /// Merges every existing file in `layers`, in order, over the defaults.
    pub fn load_layers(layers: &[impl AsRef<Path>]) -> Result<Self, SettingsError> {
        let mut merged = toml::Table::new();
        for layer in layers {
            let path = layer.as_ref();
            if !path.is_file() {
                continue;
            }
            log::debug!("Loading settings layer '{}'", path.display());
            let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let table: toml::Table =
                toml::from_str(&content).map_err(|source| SettingsError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;
            merge_tables(&mut merged, table);
        }
        let mut settings: Settings = toml::Value::Table(merged)
            .try_into()
            .map_err(SettingsError::Invalid)?;
        settings.normalize_options();
        Ok(settings)
    }

    /// Text spellings such as `"ON"` or `"off"` become booleans, matching
    /// values given on the command line.
    fn normalize_options(&mut self) {
        for value in self.options.values_mut() {
            if let OptionValue::Text(raw) = value {
                *value = toolchain_options::parse_value(raw);
            }
        }
    }

    pub fn error_regex(&self) -> Result<Option<Regex>, SettingsError> {
        match &self.activation.error_pattern {
            Some(pattern) if !pattern.is_empty() => Ok(Some(Regex::new(pattern)?)),
            _ => Ok(None),
        }
    }

    /// The default options as an ordered list, ready for a new project context.
    pub fn default_options(&self) -> Vec<ToolchainOption> {
        self.options
            .iter()
            .map(|(name, value)| ToolchainOption::new(name.clone(), value.clone()))
            .collect()
    }
}

/// Deep-merges `overlay` into `base`: nested tables merge, everything else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_files() {
        let dir = tempdir().unwrap();
        let settings = Settings::load_layers(&[dir.path().join("missing.toml")]).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tools.generator, "cmake");
        assert!(settings.error_regex().unwrap().unwrap().is_match("[ERROR:vcvars]"));
    }

    #[test]
    fn test_project_layer_overrides_user_layer_key_by_key() {
        let dir = tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");
        fs::write(
            &user,
            "[tools]\ngenerator = \"cmake3\"\ntest_runner = \"ctest3\"\n",
        )
        .unwrap();
        fs::write(
            &project,
            "[tools]\ngenerator = \"/opt/cmake/bin/cmake\"\n[options]\nSANITIZER = \"address\"\nENABLE_COVERAGE = true\n",
        )
        .unwrap();

        let settings = Settings::load_layers(&[user, project]).unwrap();
        assert_eq!(settings.tools.generator, "/opt/cmake/bin/cmake");
        assert_eq!(settings.tools.test_runner, "ctest3");
        assert_eq!(settings.tools.packager, "cpack");
        assert_eq!(
            settings.default_options(),
            vec![
                ToolchainOption::new("ENABLE_COVERAGE", OptionValue::Bool(true)),
                ToolchainOption::new("SANITIZER", OptionValue::Text("address".to_string())),
            ]
        );
    }

    #[test]
    fn test_text_option_values_are_read_as_booleans() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipewright.toml");
        fs::write(
            &path,
            "[options]\nENABLE_COVERAGE = \"ON\"\nENABLE_TESTING = \"off\"\nSANITIZER = \"address\"\n",
        )
        .unwrap();
        let settings = Settings::load_layers(&[path]).unwrap();
        assert_eq!(settings.options["ENABLE_COVERAGE"], OptionValue::Bool(true));
        assert_eq!(settings.options["ENABLE_TESTING"], OptionValue::Bool(false));
        assert_eq!(
            settings.options["SANITIZER"],
            OptionValue::Text("address".to_string())
        );
        let ctx = crate::models::ProjectContext {
            toolchain_options: settings.default_options(),
            ..Default::default()
        };
        assert!(ctx.option_enabled("ENABLE_COVERAGE"));
    }

    #[test]
    fn test_malformed_layer_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[tools\n").unwrap();
        assert!(matches!(
            Settings::load_layers(&[path]),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_error_pattern() {
        let mut settings = Settings::default();
        settings.activation.error_pattern = Some("([".to_string());
        assert!(settings.error_regex().is_err());
    }
}
