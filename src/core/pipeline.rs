// src/core/pipeline.rs

//! The external actions behind each lifecycle stage.
//!
//! Every tool invocation goes through a `ProcessRunner` as a structured
//! `CommandSpec`. Stages that need a toolchain environment first capture the
//! activation script's mutations and apply them to the `Environment`, so later
//! child processes inherit them.

use crate::{
    constants::{COMPILE_DATABASE_FILENAME, CONANFILE_NAMES},
    core::{lifecycle::StageActions, paths, settings::Settings, toolchain_options},
    models::{ProjectContext, Stage},
    system::{
        env_applier::{self, Environment},
        env_capture::{self, EnvCapture},
        executor::{CommandSpec, ProcessRunner},
        path_normalizer::PathListNormalizer,
        platform::Platform,
        shells_config::CaptureShell,
    },
};
use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How deep to search the binary directory for generated scripts and executables.
const SEARCH_DEPTH: usize = 5;

/// Which activation script a stage needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActivationKind {
    BuildTime,
    RunTime,
}

pub struct ToolPipeline<'a> {
    settings: &'a Settings,
    project_root: PathBuf,
    runner: &'a mut dyn ProcessRunner,
    env: &'a mut dyn Environment,
    shell: CaptureShell,
    normalizer: PathListNormalizer,
    error_pattern: Option<Regex>,
    activated: HashSet<String>,
}

impl<'a> ToolPipeline<'a> {
    pub fn new(
        settings: &'a Settings,
        project_root: impl Into<PathBuf>,
        runner: &'a mut dyn ProcessRunner,
        env: &'a mut dyn Environment,
    ) -> Result<Self> {
        let platform = Platform::current();
        let shell = settings
            .shell
            .clone()
            .unwrap_or_else(|| CaptureShell::default_for(platform));
        Ok(Self {
            settings,
            project_root: project_root.into(),
            runner,
            env,
            shell,
            normalizer: PathListNormalizer::new(platform),
            error_pattern: settings.error_regex()?,
            activated: HashSet::new(),
        })
    }

    /// Overrides the platform rules used for path-list normalization.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.normalizer = PathListNormalizer::new(platform);
        self
    }

    fn announce(&self, stage: Stage, view: &ProjectContext) {
        println!(
            "{} {} ({})",
            "==>".green().bold(),
            stage.as_str().cyan().bold(),
            view.preset.yellow()
        );
    }

    fn run(&mut self, spec: CommandSpec) -> Result<()> {
        println!("{}", spec.to_string().dimmed());
        self.runner.run(&spec)?;
        Ok(())
    }

    // --- Activation ---

    /// Captures and applies an activation command once per pipeline.
    fn activate(&mut self, command: &str) -> Result<()> {
        if self.activated.contains(command) {
            log::debug!("'{}' already activated.", command);
            return Ok(());
        }
        let diff = EnvCapture::new(&mut *self.runner, self.shell.clone(), self.normalizer)
            .capture(command, self.error_pattern.as_ref())
            .with_context(|| format!("Failed to activate '{}'", command))?;
        env_applier::apply(&diff, &mut *self.env)?;
        self.activated.insert(command.to_string());
        Ok(())
    }

    fn activate_toolchain(&mut self) -> Result<()> {
        let Some(setup) = &self.settings.activation.toolchain_setup else {
            return Ok(());
        };
        let command = paths::expand_template(setup)?;
        self.activate(&command)
    }

    fn activate_generated(&mut self, view: &ProjectContext, kind: ActivationKind) -> Result<()> {
        let base = match kind {
            ActivationKind::BuildTime => &self.settings.activation.build_script,
            ActivationKind::RunTime => &self.settings.activation.run_script,
        };
        let file_name = format!("{}.{}", base, self.shell.dialect.script_extension());
        match find_activation_script(&view.binary_dir, &file_name) {
            Some(script) => {
                let command = env_capture::source_command(self.shell.dialect, &script);
                self.activate(&command)
            }
            None => {
                log::debug!(
                    "No '{}' under '{}'; skipping activation.",
                    file_name,
                    view.binary_dir.display()
                );
                Ok(())
            }
        }
    }

    // --- Stages ---

    fn configure(&mut self, view: &ProjectContext) -> Result<()> {
        self.activate_toolchain()?;

        let has_conanfile = CONANFILE_NAMES
            .iter()
            .any(|name| view.source_dir.join(name).is_file());
        if has_conanfile {
            let tools = &self.settings.tools;
            let spec = CommandSpec::new(&tools.dependency_manager)
                .arg("install")
                .arg(&view.source_dir)
                .args(&tools.dependency_args)
                .arg("-s")
                .arg(format!("build_type={}", view.build_type))
                .current_dir(&view.source_dir);
            self.run(spec)?;
        }

        let spec = CommandSpec::new(&self.settings.tools.generator)
            .arg("--preset")
            .arg(&view.preset)
            .args(toolchain_options::render_definitions(&view.toolchain_options))
            .current_dir(&view.source_dir);
        self.run(spec)?;

        self.link_compile_database(view)
    }

    fn build(&mut self, view: &ProjectContext) -> Result<()> {
        self.activate_toolchain()?;
        self.activate_generated(view, ActivationKind::BuildTime)?;

        let mut spec = CommandSpec::new(&self.settings.tools.generator)
            .arg("--build")
            .arg(&view.binary_dir)
            .arg("--config")
            .arg(&view.build_type);
        if !view.build_targets.is_empty() {
            spec = spec.arg("--target").args(&view.build_targets);
        }
        self.run(spec)
    }

    fn launch(&mut self, view: &ProjectContext) -> Result<()> {
        let target = view
            .launch_target
            .as_deref()
            .ok_or_else(|| anyhow!("No launch target given. Use `pipewright run <target>`."))?;
        self.activate_toolchain()?;
        self.activate_generated(view, ActivationKind::RunTime)?;

        let executable = find_executable(&view.binary_dir, target).ok_or_else(|| {
            anyhow!(
                "Executable '{}' not found under '{}'.",
                target,
                view.binary_dir.display()
            )
        })?;
        let spec = CommandSpec::new(executable)
            .args(&view.launch_args)
            .current_dir(&view.source_dir);
        self.run(spec)
    }

    fn test(&mut self, view: &ProjectContext) -> Result<()> {
        self.activate_toolchain()?;
        self.activate_generated(view, ActivationKind::RunTime)?;

        let spec = CommandSpec::new(&self.settings.tools.test_runner)
            .arg("--test-dir")
            .arg(&view.binary_dir)
            .arg("-C")
            .arg(&view.build_type)
            .args(&view.test_args)
            .current_dir(&view.source_dir);
        self.run(spec)
    }

    fn coverage(&mut self, view: &ProjectContext) -> Result<()> {
        self.test(view)?;

        let tools = &self.settings.tools;
        let spec = CommandSpec::new(&tools.coverage)
            .arg("--root")
            .arg(&view.source_dir)
            .arg(&view.binary_dir)
            .args(&tools.coverage_args)
            .current_dir(&view.source_dir);
        self.run(spec)
    }

    fn install(&mut self, view: &ProjectContext) -> Result<()> {
        self.activate_toolchain()?;
        let spec = CommandSpec::new(&self.settings.tools.generator)
            .arg("--install")
            .arg(&view.binary_dir)
            .arg("--config")
            .arg(&view.build_type)
            .arg("--prefix")
            .arg(&view.install_dir);
        self.run(spec)
    }

    fn pack(&mut self, view: &ProjectContext) -> Result<()> {
        self.activate_toolchain()?;
        let spec = CommandSpec::new(&self.settings.tools.packager)
            .arg("--config")
            .arg(view.binary_dir.join("CPackConfig.cmake"))
            .arg("-C")
            .arg(&view.build_type)
            .current_dir(&view.binary_dir);
        self.run(spec)
    }

    fn clean(&mut self, view: &ProjectContext) -> Result<()> {
        let binary_dir = &view.binary_dir;
        if view.source_dir.starts_with(binary_dir) {
            return Err(anyhow!(
                "Refusing to delete '{}': it contains the source directory.",
                binary_dir.display()
            ));
        }
        if binary_dir.exists() {
            println!("{} {}", "Removing".dimmed(), binary_dir.display());
            fs::remove_dir_all(binary_dir).with_context(|| {
                format!("Failed to remove build directory '{}'", binary_dir.display())
            })?;
        } else {
            log::debug!("'{}' does not exist; nothing to clean.", binary_dir.display());
        }
        Ok(())
    }

    /// Exposes the generated compile database at the project root, where
    /// editors and language servers look for it.
    fn link_compile_database(&self, view: &ProjectContext) -> Result<()> {
        let source = view.binary_dir.join(COMPILE_DATABASE_FILENAME);
        if !source.is_file() {
            log::warn!(
                "No {} in '{}'; set CMAKE_EXPORT_COMPILE_COMMANDS to generate one.",
                COMPILE_DATABASE_FILENAME,
                view.binary_dir.display()
            );
            return Ok(());
        }
        let dest = self.project_root.join(COMPILE_DATABASE_FILENAME);
        if dest.symlink_metadata().is_ok() {
            fs::remove_file(&dest)?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, &dest)?;
        #[cfg(not(unix))]
        fs::copy(&source, &dest)?;

        log::debug!("Linked {} -> {}", dest.display(), source.display());
        Ok(())
    }
}

impl StageActions for ToolPipeline<'_> {
    fn execute(&mut self, stage: Stage, view: &ProjectContext) -> Result<()> {
        self.announce(stage, view);
        match stage {
            Stage::Setup => Ok(()),
            Stage::Clean => self.clean(view),
            Stage::Config => self.configure(view),
            Stage::Build => self.build(view),
            Stage::Run => self.launch(view),
            Stage::Test => self.test(view),
            Stage::Cov => self.coverage(view),
            Stage::Install => self.install(view),
            Stage::Pack => self.pack(view),
        }
    }
}

/// Looks for `<binary_dir>/generators/<file_name>`, then anywhere below the
/// binary directory.
fn find_activation_script(binary_dir: &Path, file_name: &str) -> Option<PathBuf> {
    let direct = binary_dir.join("generators").join(file_name);
    if direct.is_file() {
        return Some(direct);
    }
    find_file(binary_dir, OsStr::new(file_name))
}

fn find_executable(binary_dir: &Path, target: &str) -> Option<PathBuf> {
    let file_name = format!("{}{}", target, std::env::consts::EXE_SUFFIX);
    let direct = binary_dir.join(&file_name);
    if direct.is_file() {
        return Some(direct);
    }
    find_file(binary_dir, OsStr::new(&file_name))
}

fn find_file(root: &Path, file_name: &OsStr) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
        .map(|entry| entry.into_path())
}
