// src/cli/handlers/status.rs

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::{
    cli::{dispatcher::Invocation, handlers::commons::{self, Session}},
    models::ProjectContext,
};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Shows the project context.")]
struct StatusArgs {}

pub fn handle(invocation: Invocation) -> Result<()> {
    let _: StatusArgs = commons::parse_args(&invocation.args)?;
    let session = Session::open()?;
    print!("{}", render(&session.context));
    Ok(())
}

fn render(ctx: &ProjectContext) -> String {
    let list = |values: &[String]| {
        if values.is_empty() {
            "-".dimmed().to_string()
        } else {
            values.join(" ")
        }
    };

    let mut out = String::new();
    out.push_str(&format!("\n--- {} '{}' ---\n", "Preset".bold(), ctx.preset.cyan()));
    out.push_str(&format!("  {:<14} {}\n", "Stage:", ctx.stage.as_str().yellow().bold()));
    out.push_str(&format!("  {:<14} {}\n", "Build type:", ctx.build_type));
    out.push_str(&format!("  {:<14} {}\n", "Source:", ctx.source_dir.display()));
    out.push_str(&format!("  {:<14} {}\n", "Build dir:", ctx.binary_dir.display()));
    out.push_str(&format!("  {:<14} {}\n", "Install dir:", ctx.install_dir.display()));

    out.push_str(&format!("\n{}\n", "Options:".bold()));
    for opt in &ctx.toolchain_options {
        out.push_str(&format!("  {} = {}\n", opt.name, opt.value));
    }

    out.push_str(&format!("\n{}\n", "Last used:".bold()));
    out.push_str(&format!("  {:<14} {}\n", "Targets:", list(&ctx.build_targets)));
    out.push_str(&format!(
        "  {:<14} {}\n",
        "Launch:",
        ctx.launch_target.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("  {:<14} {}\n", "Launch args:", list(&ctx.launch_args)));
    out.push_str(&format!("  {:<14} {}\n", "Test args:", list(&ctx.test_args)));
    out
}
