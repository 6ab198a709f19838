// src/cli/handlers/commons.rs

// Shared plumbing for the handlers: argument parsing and the project session.

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};

use crate::{
    core::{
        lifecycle::{ActionParams, Lifecycle},
        paths,
        pipeline::ToolPipeline,
        settings::Settings,
    },
    models::{OptionValue, ProjectContext, Stage},
    state::JsonContextStore,
    system::{env_applier::ProcessEnvironment, executor::SystemRunner},
};

/// Parses an action's arguments. `--help` prints and exits like a top-level parse.
pub fn parse_args<T: Parser>(args: &[String]) -> Result<T> {
    T::try_parse_from(args).map_err(|e| match e.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => e.exit(),
        _ => e.into(),
    })
}

/// Everything an action needs about the current project.
pub struct Session {
    pub root: PathBuf,
    pub settings: Settings,
    pub store: JsonContextStore,
    pub context: ProjectContext,
}

impl Session {
    /// Opens the project containing the working directory.
    pub fn open() -> Result<Self> {
        let cwd = env::current_dir().context("Could not determine the working directory")?;
        Self::open_at(&cwd)
    }

    pub fn open_at(start: &Path) -> Result<Self> {
        let root = paths::find_project_root(start);
        log::debug!("Project root: {}", root.display());
        let settings = Settings::load(&root)?;
        let mut store = JsonContextStore::new(paths::context_path(&root));
        let context = store.load()?;
        Ok(Self {
            root,
            settings,
            store,
            context,
        })
    }

    /// Brings the project to `stage` with the real toolchain.
    pub fn request(&mut self, stage: Stage, params: &ActionParams) -> Result<()> {
        let (mut runner, mut env) = (SystemRunner, ProcessEnvironment);
        let mut pipeline = ToolPipeline::new(&self.settings, &self.root, &mut runner, &mut env)?;
        let mut lifecycle = Lifecycle::new(
            &mut pipeline,
            &mut self.store,
            self.settings.activation.coverage_option.as_str(),
        );
        lifecycle.request(&mut self.context, stage, params)
    }

    /// Sets one toolchain option, persisting it. Returns `true` when it changed.
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> Result<bool> {
        let (mut runner, mut env) = (SystemRunner, ProcessEnvironment);
        let mut pipeline = ToolPipeline::new(&self.settings, &self.root, &mut runner, &mut env)?;
        let mut lifecycle = Lifecycle::new(
            &mut pipeline,
            &mut self.store,
            self.settings.activation.coverage_option.as_str(),
        );
        lifecycle.set_option(&mut self.context, name, value)
    }
}
