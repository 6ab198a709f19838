// src/cli/handlers/setup.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::Colorize;
use dialoguer::{Select, theme::ColorfulTheme};
use std::env;

use crate::{
    cli::{dispatcher::Invocation, handlers::commons},
    core::{
        paths,
        presets::{Preset, PresetCatalog},
        settings::Settings,
    },
    models::{ProjectContext, Stage},
    state::{ContextStore, JsonContextStore},
};

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Selects a configure preset and starts a fresh lifecycle."
)]
struct SetupArgs {
    /// The configure preset. Asked interactively when omitted.
    preset: Option<String>,
}

pub fn handle(invocation: Invocation) -> Result<()> {
    let args: SetupArgs = commons::parse_args(&invocation.args)?;
    let cwd = env::current_dir().context("Could not determine the working directory")?;
    let root = paths::find_project_root(&cwd);

    let catalog = PresetCatalog::load(&root)?;
    let settings = Settings::load(&root)?;
    let mut store = JsonContextStore::new(paths::context_path(&root));
    let previous = load_previous(&mut store);

    let name = match (args.preset, &previous) {
        (Some(name), _) => name,
        (None, Some(prev)) if invocation.reuse_last => prev.preset.clone(),
        (None, _) => select_preset(&catalog)?,
    };
    let preset = catalog.resolve(&name)?;
    let ctx = new_context(preset, &settings, previous.as_ref());
    store.save(&ctx)?;

    println!(
        "\n{} Project set up with preset '{}' ({}).",
        "✔".green(),
        ctx.preset.cyan(),
        ctx.build_type
    );
    println!("  {} {}", "build:".dimmed(), ctx.binary_dir.display());
    println!("  {} {}", "install:".dimmed(), ctx.install_dir.display());
    Ok(())
}

/// An unreadable previous context is replaced rather than fatal.
fn load_previous(store: &mut JsonContextStore) -> Option<ProjectContext> {
    if !store.exists() {
        return None;
    }
    match store.load() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            log::warn!("Ignoring previous project context: {}", e);
            None
        }
    }
}

fn select_preset(catalog: &PresetCatalog) -> Result<String> {
    let names = catalog.visible_names();
    if names.is_empty() {
        return Err(anyhow!("No selectable configure presets were found."));
    }
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a configure preset")
        .items(&names)
        .default(0)
        .interact()?;
    Ok(names[selection].clone())
}

/// Builds the context for a freshly selected preset. Toolchain options and
/// the last-used parameters survive a re-setup; the stage always restarts.
fn new_context(
    preset: Preset,
    settings: &Settings,
    previous: Option<&ProjectContext>,
) -> ProjectContext {
    let mut ctx = ProjectContext {
        preset: preset.name,
        source_dir: preset.source_dir,
        binary_dir: preset.binary_dir,
        install_dir: preset.install_dir,
        build_type: preset.build_type,
        toolchain_options: settings.default_options(),
        stage: Stage::Setup,
        ..Default::default()
    };
    if let Some(prev) = previous {
        for opt in &prev.toolchain_options {
            ctx.set_option(&opt.name, opt.value.clone());
        }
        ctx.build_targets = prev.build_targets.clone();
        ctx.launch_target = prev.launch_target.clone();
        ctx.launch_args = prev.launch_args.clone();
        ctx.test_args = prev.test_args.clone();
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionValue, ToolchainOption};
    use std::path::PathBuf;

    fn preset() -> Preset {
        Preset {
            name: "release".to_string(),
            source_dir: PathBuf::from("/src"),
            binary_dir: PathBuf::from("/src/build/release"),
            install_dir: PathBuf::from("/src/install"),
            build_type: "Release".to_string(),
        }
    }

    #[test]
    fn test_new_context_seeds_default_options() {
        let ctx = new_context(preset(), &Settings::default(), None);
        assert_eq!(ctx.stage, Stage::Setup);
        assert_eq!(ctx.build_type, "Release");
        assert_eq!(
            ctx.toolchain_options,
            vec![ToolchainOption::new("ENABLE_COVERAGE", OptionValue::Bool(false))]
        );
    }

    #[test]
    fn test_resetup_keeps_options_and_parameters() {
        let previous = ProjectContext {
            preset: "debug".to_string(),
            toolchain_options: vec![
                ToolchainOption::new("ENABLE_COVERAGE", OptionValue::Bool(true)),
                ToolchainOption::new("SANITIZER", OptionValue::Text("address".to_string())),
            ],
            launch_target: Some("intro".to_string()),
            stage: Stage::Install,
            ..Default::default()
        };
        let ctx = new_context(preset(), &Settings::default(), Some(&previous));
        assert_eq!(ctx.preset, "release");
        assert_eq!(ctx.stage, Stage::Setup);
        assert!(ctx.option_enabled("ENABLE_COVERAGE"));
        assert_eq!(
            ctx.option("SANITIZER"),
            Some(&OptionValue::Text("address".to_string()))
        );
        assert_eq!(ctx.launch_target.as_deref(), Some("intro"));
    }
}
