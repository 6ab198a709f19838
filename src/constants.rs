// src/constants.rs

/// The name of the directory holding pipewright state for a project.
pub const STATE_DIR: &str = ".pipewright";

/// The name of the persisted project context (inside .pipewright/).
pub const CONTEXT_FILENAME: &str = "context.json";

/// The name of the optional per-project settings file (at the project root).
pub const PROJECT_SETTINGS_FILENAME: &str = "pipewright.toml";

/// The name of the user-level settings file (in ~/.config/pipewright/).
pub const USER_SETTINGS_FILENAME: &str = "config.toml";

/// The CMake preset files read at setup time.
pub const PRESETS_FILENAME: &str = "CMakePresets.json";
pub const USER_PRESETS_FILENAME: &str = "CMakeUserPresets.json";

/// The compile database produced by the configure step.
pub const COMPILE_DATABASE_FILENAME: &str = "compile_commands.json";

/// Conan recipes that trigger a dependency install during configure.
pub const CONANFILE_NAMES: &[&str] = &["conanfile.py", "conanfile.txt"];

/// Suffix on an action name that reuses the last stored targets and arguments.
pub const REUSE_MARKER: char = '+';
