// src/cli/dispatcher.rs

use anyhow::{Result, anyhow};
use colored::Colorize;

use crate::{cli::handlers, constants::REUSE_MARKER};

/// What a handler receives: the action's own arguments and whether the
/// action was suffixed with the reuse marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub reuse_last: bool,
    pub args: Vec<String>,
}

/// Defines a command, its aliases and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    summary: &'static str,
    handler: fn(Invocation) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "setup",
        aliases: &[],
        summary: "Select a configure preset and start a fresh lifecycle",
        handler: handlers::setup::handle,
    },
    CommandDefinition {
        name: "clean",
        aliases: &[],
        summary: "Remove the build directory",
        handler: handlers::stages::handle_clean,
    },
    CommandDefinition {
        name: "config",
        aliases: &["configure"],
        summary: "Install dependencies and generate the build files",
        handler: handlers::stages::handle_config,
    },
    CommandDefinition {
        name: "build",
        aliases: &[],
        summary: "Build the given targets (default: all)",
        handler: handlers::stages::handle_build,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        summary: "Rebuild and launch an executable target",
        handler: handlers::stages::handle_run,
    },
    CommandDefinition {
        name: "test",
        aliases: &[],
        summary: "Rebuild and run the test suite",
        handler: handlers::stages::handle_test,
    },
    CommandDefinition {
        name: "cov",
        aliases: &["coverage"],
        summary: "Run the test suite with coverage instrumentation",
        handler: handlers::stages::handle_cov,
    },
    CommandDefinition {
        name: "install",
        aliases: &[],
        summary: "Rebuild and install into the preset's install directory",
        handler: handlers::stages::handle_install,
    },
    CommandDefinition {
        name: "pack",
        aliases: &["package"],
        summary: "Rebuild and create distributable packages",
        handler: handlers::stages::handle_pack,
    },
    CommandDefinition {
        name: "option",
        aliases: &["opt"],
        summary: "List or set toolchain options (NAME=VALUE)",
        handler: handlers::option::handle,
    },
    CommandDefinition {
        name: "status",
        aliases: &["st"],
        summary: "Show the project context",
        handler: handlers::status::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Splits `build+` into `("build", true)`.
fn parse_action(raw: &str) -> (&str, bool) {
    match raw.strip_suffix(REUSE_MARKER) {
        Some(name) => (name, true),
        None => (raw, false),
    }
}

fn print_usage() {
    println!(
        "{} pipewright <action>[{}] [target...] [-- args...]\n",
        "Usage:".yellow().bold(),
        REUSE_MARKER
    );
    println!("{}", "Actions:".yellow().bold());
    for cmd in COMMAND_REGISTRY {
        println!("  {:<10} {}", cmd.name.cyan(), cmd.summary);
    }
}

/// Routes `<action>[+] [args...]` to its handler.
pub fn dispatch(all_args: Vec<String>) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    let mut args = all_args.into_iter();
    let Some(raw_action) = args.next() else {
        print_usage();
        return Ok(());
    };

    let (name, reuse_last) = parse_action(&raw_action);
    let command = find_command(name).ok_or_else(|| {
        let known: Vec<&str> = COMMAND_REGISTRY.iter().map(|c| c.name).collect();
        anyhow!("Unknown action '{}'. Known actions: {}", name, known.join(", "))
    })?;

    (command.handler)(Invocation {
        reuse_last,
        args: args.collect(),
    })
}
