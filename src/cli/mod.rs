// src/cli/mod.rs

use clap::Parser;

pub mod dispatcher;
pub mod handlers;

/// pipewright: a stateful front end for CMake/Conan project pipelines.
///
/// Usage: `pipewright <action>[+] [target...] [-- args...]`
///
/// Actions: setup, clean, config, build, run, test, cov, install, pack,
/// option, status. A trailing `+` on the action reuses the targets and
/// arguments stored by the previous invocation.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// The action followed by its targets and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}
