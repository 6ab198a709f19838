// src/cli/handlers/option.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::{
    cli::{dispatcher::Invocation, handlers::commons::{self, Session}},
    core::toolchain_options,
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Lists toolchain options, or sets them with NAME=VALUE."
)]
struct OptionArgs {
    /// Assignments such as `ENABLE_COVERAGE=ON`.
    assignments: Vec<String>,
}

pub fn handle(invocation: Invocation) -> Result<()> {
    let args: OptionArgs = commons::parse_args(&invocation.args)?;
    let mut session = Session::open()?;

    if args.assignments.is_empty() {
        if session.context.toolchain_options.is_empty() {
            println!("{}", "No toolchain options set.".dimmed());
        }
        for opt in &session.context.toolchain_options {
            println!("  {} = {}", opt.name.cyan(), opt.value);
        }
        return Ok(());
    }

    // Parse everything before changing anything.
    let options = args
        .assignments
        .iter()
        .map(|raw| toolchain_options::parse_assignment(raw))
        .collect::<Result<Vec<_>>>()?;

    for opt in options {
        if session.set_option(&opt.name, opt.value.clone())? {
            println!("  {} = {}", opt.name.cyan(), opt.value.to_string().green());
        } else {
            println!("  {} = {} {}", opt.name.cyan(), opt.value, "(unchanged)".dimmed());
        }
    }
    println!(
        "Current stage: {}",
        session.context.stage.as_str().yellow()
    );
    Ok(())
}
