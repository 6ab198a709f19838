// src/system/shells_config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::system::platform::Platform;

/// The shell used to run an activation command inside a disposable subshell.
///
/// The capture script is written to a temporary file with `script_extension`
/// and executed as `<program> <args...> <script>`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CaptureShell {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Which dialect the generated script is written in.
    pub dialect: ShellDialect,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShellDialect {
    /// POSIX shells: `env` listing, command sourced with `.`.
    Posix,
    /// cmd.exe: `set` listing, command run with `call`.
    Cmd,
}

impl ShellDialect {
    pub fn script_extension(self) -> &'static str {
        match self {
            ShellDialect::Posix => "sh",
            ShellDialect::Cmd => "bat",
        }
    }
}

impl CaptureShell {
    /// The default capture shell for a platform: `cmd.exe` on Windows, `bash`
    /// elsewhere (falling back to `sh` when bash is not installed).
    pub fn default_for(platform: Platform) -> Self {
        match platform {
            Platform::Windows => CaptureShell {
                program: PathBuf::from("cmd.exe"),
                args: vec!["/d".to_string(), "/c".to_string()],
                dialect: ShellDialect::Cmd,
            },
            Platform::Unix => {
                let program = if crate::system::executor::is_executable_in_path("bash") {
                    "bash"
                } else {
                    "sh"
                };
                CaptureShell {
                    program: PathBuf::from(program),
                    args: Vec::new(),
                    dialect: ShellDialect::Posix,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_default_uses_cmd() {
        let shell = CaptureShell::default_for(Platform::Windows);
        assert_eq!(shell.dialect, ShellDialect::Cmd);
        assert_eq!(shell.dialect.script_extension(), "bat");
        assert_eq!(shell.args, vec!["/d", "/c"]);
    }

    #[test]
    fn test_shell_deserializes_from_toml() {
        let shell: CaptureShell =
            toml::from_str("program = \"/bin/zsh\"\ndialect = \"posix\"").unwrap();
        assert_eq!(shell.program, PathBuf::from("/bin/zsh"));
        assert!(shell.args.is_empty());
    }
}
