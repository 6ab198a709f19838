// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// --- LIFECYCLE MODELS ---

/// One named point in the build lifecycle.
///
/// Stages are ordered by [`Stage::rank`], not by declaration order: `Run`, `Test`
/// and `Cov` are peers that share a rank, so `Stage` deliberately does not
/// implement `Ord`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Setup,
    Clean,
    Config,
    Build,
    Run,
    Test,
    Cov,
    Install,
    Pack,
}

impl Stage {
    /// Every stage, lowest rank first.
    pub const ALL: [Stage; 9] = [
        Stage::Setup,
        Stage::Clean,
        Stage::Config,
        Stage::Build,
        Stage::Run,
        Stage::Test,
        Stage::Cov,
        Stage::Install,
        Stage::Pack,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Stage::Setup => 0,
            Stage::Clean => 1,
            Stage::Config => 2,
            Stage::Build => 3,
            Stage::Run | Stage::Test | Stage::Cov => 4,
            Stage::Install => 5,
            Stage::Pack => 6,
        }
    }

    /// The stage that must have been reached before this one's action may run.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::Setup | Stage::Clean | Stage::Config => None,
            Stage::Build => Some(Stage::Config),
            Stage::Run | Stage::Test | Stage::Cov | Stage::Install => Some(Stage::Build),
            // Packages are assembled from the installed tree.
            Stage::Pack => Some(Stage::Install),
        }
    }

    /// Stages that always attempt a rebuild first, since sources may have
    /// changed since a later stage was last reached.
    pub fn forces_rebuild(self) -> bool {
        matches!(self, Stage::Run | Stage::Test | Stage::Install | Stage::Pack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Clean => "clean",
            Stage::Config => "config",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Test => "test",
            Stage::Cov => "cov",
            Stage::Install => "install",
            Stage::Pack => "pack",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- TOOLCHAIN OPTION MODELS ---

/// The value of a toolchain option. Booleans render as `ON`/`OFF` build flags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Text(String),
}

impl OptionValue {
    pub fn is_enabled(&self) -> bool {
        matches!(self, OptionValue::Bool(true))
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(true) => f.write_str("ON"),
            OptionValue::Bool(false) => f.write_str("OFF"),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single named feature flag passed to the build-file generator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolchainOption {
    pub name: String,
    pub value: OptionValue,
}

impl ToolchainOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// --- PROJECT CONTEXT ---

/// The persisted state of a project, one per project root.
///
/// It is loaded at the start of an action and written back only after a stage
/// completes successfully, so a failed or interrupted run leaves the previous
/// record authoritative.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectContext {
    pub preset: String,
    pub source_dir: PathBuf,
    pub binary_dir: PathBuf,
    pub install_dir: PathBuf,
    pub build_type: String,
    #[serde(default)]
    pub toolchain_options: Vec<ToolchainOption>,
    #[serde(default)]
    pub build_targets: Vec<String>,
    #[serde(default)]
    pub launch_target: Option<String>,
    #[serde(default)]
    pub launch_args: Vec<String>,
    #[serde(default)]
    pub test_args: Vec<String>,
    #[serde(default)]
    pub stage: Stage,
}

impl ProjectContext {
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.toolchain_options
            .iter()
            .find(|opt| opt.name == name)
            .map(|opt| &opt.value)
    }

    pub fn option_enabled(&self, name: &str) -> bool {
        self.option(name).is_some_and(OptionValue::is_enabled)
    }

    /// Sets an option, keeping its position if it already exists.
    /// Returns `true` when the stored value actually changed.
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> bool {
        match self.toolchain_options.iter_mut().find(|opt| opt.name == name) {
            Some(existing) if existing.value == value => false,
            Some(existing) => {
                existing.value = value;
                true
            }
            None => {
                self.toolchain_options.push(ToolchainOption::new(name, value));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_stages_share_a_rank() {
        assert_eq!(Stage::Run.rank(), Stage::Test.rank());
        assert_eq!(Stage::Test.rank(), Stage::Cov.rank());
        assert!(Stage::Cov.rank() > Stage::Build.rank());
        assert!(Stage::Install.rank() > Stage::Cov.rank());
    }

    #[test]
    fn test_prerequisites() {
        assert_eq!(Stage::Config.prerequisite(), None);
        assert_eq!(Stage::Build.prerequisite(), Some(Stage::Config));
        assert_eq!(Stage::Run.prerequisite(), Some(Stage::Build));
        assert_eq!(Stage::Install.prerequisite(), Some(Stage::Build));
        assert_eq!(Stage::Pack.prerequisite(), Some(Stage::Install));
    }

    #[test]
    fn test_set_option_reports_changes() {
        let mut ctx = ProjectContext::default();
        assert!(ctx.set_option("ENABLE_COVERAGE", OptionValue::Bool(false)));
        assert!(!ctx.set_option("ENABLE_COVERAGE", OptionValue::Bool(false)));
        assert!(ctx.set_option("ENABLE_COVERAGE", OptionValue::Bool(true)));
        assert!(ctx.option_enabled("ENABLE_COVERAGE"));
        assert_eq!(ctx.toolchain_options.len(), 1);
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&Stage::Cov).unwrap();
        assert_eq!(json, "\"cov\"");
    }
}
