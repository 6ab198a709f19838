// src/core/lifecycle.rs

//! # Build Lifecycle
//!
//! Decides which stages must run before a requested one, runs them in order
//! and advances the persisted stage cursor after each success.
//!
//! Two rules here are easy to break:
//!
//! - **Rebuild before use.** Run, Test, Install and Pack drop the cursor back to
//!   Config when it is past it, so the build step always runs first. Sources may
//!   have changed since the later stage was reached.
//! - **Coverage handshake.** Coverage instrumentation is a configure-time flag.
//!   `cov` with the coverage option off configures and builds with a temporary
//!   override, runs the coverage action and leaves the cursor at Cov while the
//!   stored option stays off. Any later action other than `cov`/`clean` that
//!   sees Cov with the option off restarts from Setup to drop the
//!   instrumentation again. Each half is useless without the other.

use crate::{
    models::{OptionValue, ProjectContext, Stage},
    state::ContextStore,
};
use anyhow::{Context, Result};

/// Runs the external action for one stage.
pub trait StageActions {
    /// `view` is the context as the stage should see it: the stored record
    /// plus the request's new parameters and any temporary option override.
    fn execute(&mut self, stage: Stage, view: &ProjectContext) -> Result<()>;
}

/// Parameters supplied with a request. `None` keeps the stored value.
/// They are committed to the context only once the requested stage succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionParams {
    pub build_targets: Option<Vec<String>>,
    pub launch_target: Option<String>,
    pub launch_args: Option<Vec<String>>,
    pub test_args: Option<Vec<String>>,
}

impl ActionParams {
    fn apply_to(&self, ctx: &mut ProjectContext) {
        if let Some(targets) = &self.build_targets {
            ctx.build_targets = targets.clone();
        }
        if let Some(target) = &self.launch_target {
            ctx.launch_target = Some(target.clone());
        }
        if let Some(args) = &self.launch_args {
            ctx.launch_args = args.clone();
        }
        if let Some(args) = &self.test_args {
            ctx.test_args = args.clone();
        }
    }
}

pub struct Lifecycle<'a> {
    actions: &'a mut dyn StageActions,
    store: &'a mut dyn ContextStore,
    coverage_option: String,
    coverage_override: bool,
    persistence_suspended: bool,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        actions: &'a mut dyn StageActions,
        store: &'a mut dyn ContextStore,
        coverage_option: impl Into<String>,
    ) -> Self {
        Self {
            actions,
            store,
            coverage_option: coverage_option.into(),
            coverage_override: false,
            persistence_suspended: false,
        }
    }

    /// Brings the project to `stage`, running missing prerequisites first.
    ///
    /// On error nothing past the last successful stage is committed or saved.
    pub fn request(
        &mut self,
        ctx: &mut ProjectContext,
        stage: Stage,
        params: &ActionParams,
    ) -> Result<()> {
        log::debug!("Requested '{}' at stage '{}'", stage, ctx.stage);
        let coverage_enabled = self.coverage_enabled(ctx);

        if stage != Stage::Cov
            && stage != Stage::Clean
            && ctx.stage == Stage::Cov
            && !coverage_enabled
        {
            log::info!("Last build was instrumented for coverage; reconfiguring.");
            ctx.stage = Stage::Setup;
        }

        if stage == Stage::Clean {
            self.run_action(ctx, Stage::Clean, params)?;
            return Ok(());
        }

        if stage == Stage::Cov && !coverage_enabled {
            return self.request_with_coverage_override(ctx, params);
        }

        if stage.forces_rebuild() && ctx.stage.rank() > Stage::Config.rank() {
            log::debug!("'{}' forces a rebuild; stage reset to config.", stage);
            ctx.stage = Stage::Config;
        }

        if let Some(prerequisite) = stage.prerequisite() {
            if ctx.stage.rank() < prerequisite.rank() {
                self.request(ctx, prerequisite, &ActionParams::default())?;
            }
        }

        self.run_action(ctx, stage, params)
    }

    /// Sets an option. A changed value invalidates the generated build files.
    /// Returns `true` when the value changed.
    pub fn set_option(
        &mut self,
        ctx: &mut ProjectContext,
        name: &str,
        value: OptionValue,
    ) -> Result<bool> {
        if !ctx.set_option(name, value) {
            return Ok(false);
        }
        if ctx.stage.rank() > Stage::Clean.rank() {
            log::debug!("Option '{}' changed; stage reset to setup.", name);
            ctx.stage = Stage::Setup;
        }
        self.persist(ctx)?;
        Ok(true)
    }

    fn request_with_coverage_override(
        &mut self,
        ctx: &mut ProjectContext,
        params: &ActionParams,
    ) -> Result<()> {
        log::info!(
            "'{}' is off; configuring a temporary coverage build.",
            self.coverage_option
        );
        // Record the downgrade first: if the chain fails half-way, the build
        // directory may hold instrumented files and must be reconfigured.
        ctx.stage = Stage::Setup;
        self.persist(ctx)?;

        self.coverage_override = true;
        self.persistence_suspended = true;
        let result = self.request(ctx, Stage::Cov, params);
        self.coverage_override = false;
        self.persistence_suspended = false;
        result?;

        // The stage stays at Cov so the next non-coverage action reconfigures.
        self.persist(ctx)
    }

    fn run_action(
        &mut self,
        ctx: &mut ProjectContext,
        stage: Stage,
        params: &ActionParams,
    ) -> Result<()> {
        let view = self.view(ctx, params);
        let _timer = crate::dev_utils::BlockTimer::new(format!("stage {}", stage));
        self.actions
            .execute(stage, &view)
            .with_context(|| format!("The '{}' stage failed", stage))?;

        params.apply_to(ctx);
        ctx.stage = stage;
        log::debug!("Stage advanced to '{}'", stage);
        self.persist(ctx)
    }

    fn view(&self, ctx: &ProjectContext, params: &ActionParams) -> ProjectContext {
        let mut view = ctx.clone();
        params.apply_to(&mut view);
        if self.coverage_override {
            view.set_option(&self.coverage_option, OptionValue::Bool(true));
        }
        view
    }

    fn coverage_enabled(&self, ctx: &ProjectContext) -> bool {
        self.coverage_override || ctx.option_enabled(&self.coverage_option)
    }

    fn persist(&mut self, ctx: &ProjectContext) -> Result<()> {
        if self.persistence_suspended {
            return Ok(());
        }
        self.store
            .save(ctx)
            .context("Failed to save the project context")
    }
}
