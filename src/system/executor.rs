// src/system/executor.rs

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] std::io::Error),
    #[error("Command '{command}' exited with a non-zero status ({code}).")]
    NonZeroExitStatus { command: String, code: String },
}

/// A program and its argument list. Arguments are passed to the OS verbatim,
/// never re-split or re-quoted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The arguments as lossy strings, mostly for assertions and logs.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn to_std(&self) -> StdCommand {
        let mut command = StdCommand::new(&self.program);
        command.args(&self.args);
        if let Some(cwd) = &self.cwd {
            command.current_dir(dunce::simplified(cwd));
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|a| a.to_string_lossy()));
        let rendered: Vec<String> = parts
            .map(|p| {
                shlex::try_quote(&p)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| p.into_owned())
            })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

/// Spawns external processes. Abstracted so stage actions can be exercised
/// without the real toolchain installed.
pub trait ProcessRunner {
    /// Runs a command with inherited stdio and waits for it to finish.
    fn run(&mut self, spec: &CommandSpec) -> Result<(), ExecutionError>;

    /// Runs a command, capturing stdout as raw bytes. Stderr is passed through.
    fn capture(&mut self, spec: &CommandSpec) -> Result<Vec<u8>, ExecutionError>;
}

/// The real process runner.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, spec: &CommandSpec) -> Result<(), ExecutionError> {
        log::debug!("Running: {}", spec);
        let status = spec
            .to_std()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(spec, e))?;

        if !status.success() {
            return Err(ExecutionError::NonZeroExitStatus {
                command: spec.to_string(),
                code: exit_code_label(status.code()),
            });
        }
        Ok(())
    }

    fn capture(&mut self, spec: &CommandSpec) -> Result<Vec<u8>, ExecutionError> {
        log::debug!("Capturing: {}", spec);
        let output = spec
            .to_std()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| spawn_error(spec, e))?;

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExitStatus {
                command: spec.to_string(),
                code: exit_code_label(output.status.code()),
            });
        }

        Ok(output.stdout)
    }
}

fn spawn_error(spec: &CommandSpec, e: std::io::Error) -> ExecutionError {
    if e.kind() == ErrorKind::NotFound {
        log::debug!("Program '{}' was not found in PATH.", spec.program.to_string_lossy());
    }
    ExecutionError::CommandFailed(spec.to_string(), e)
}

fn exit_code_label(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "terminated by signal".to_string(),
    }
}

/// Returns true if an executable with this name can be found in `PATH`.
pub fn is_executable_in_path(executable_name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|path_var| {
            std::env::split_paths(&path_var).any(|dir| dir.join(executable_name).is_file())
        })
        .unwrap_or(false)
}

/// Resolves `path` relative to `base` unless it is already absolute.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
