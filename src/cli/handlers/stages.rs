// src/cli/handlers/stages.rs

//! Handlers for the lifecycle actions.
//!
//! Each one turns its arguments into `ActionParams` and asks the lifecycle for
//! the stage. Without the reuse marker the given targets and arguments replace
//! the stored ones, even when empty. With it, anything not given is taken from
//! the previous invocation.

use anyhow::{Result, anyhow};
use clap::Parser;

use crate::{
    cli::{dispatcher::Invocation, handlers::commons::{self, Session}},
    core::lifecycle::ActionParams,
    models::Stage,
};

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Runs a lifecycle stage.")]
struct NoArgs {}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Builds the given targets.")]
struct BuildArgs {
    /// Targets to build. Builds the default target when empty.
    targets: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Launches an executable target.")]
struct RunArgs {
    /// The executable target to launch.
    target: Option<String>,
    /// Arguments passed to the executable.
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Runs the test suite.")]
struct TestArgs {
    /// Arguments passed to the test runner.
    #[arg(last = true)]
    args: Vec<String>,
}

/// `None` keeps the stored list: only when reusing and nothing new was given.
fn replace_or_reuse(values: Vec<String>, reuse_last: bool) -> Option<Vec<String>> {
    if reuse_last && values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn build_params(invocation: &Invocation) -> Result<ActionParams> {
    let args: BuildArgs = commons::parse_args(&invocation.args)?;
    Ok(ActionParams {
        build_targets: replace_or_reuse(args.targets, invocation.reuse_last),
        ..Default::default()
    })
}

fn run_params(invocation: &Invocation) -> Result<ActionParams> {
    let args: RunArgs = commons::parse_args(&invocation.args)?;
    if args.target.is_none() && !invocation.reuse_last {
        return Err(anyhow!(
            "`run` needs a target. Use `run <target> [-- args...]`, or `run+` to reuse the last one."
        ));
    }
    Ok(ActionParams {
        launch_target: args.target,
        launch_args: replace_or_reuse(args.args, invocation.reuse_last),
        ..Default::default()
    })
}

fn test_params(invocation: &Invocation) -> Result<ActionParams> {
    let args: TestArgs = commons::parse_args(&invocation.args)?;
    Ok(ActionParams {
        test_args: replace_or_reuse(args.args, invocation.reuse_last),
        ..Default::default()
    })
}

fn no_params(invocation: &Invocation) -> Result<ActionParams> {
    let _: NoArgs = commons::parse_args(&invocation.args)?;
    Ok(ActionParams::default())
}

fn request(stage: Stage, params: ActionParams) -> Result<()> {
    let mut session = Session::open()?;
    session.request(stage, &params)
}

pub fn handle_clean(invocation: Invocation) -> Result<()> {
    request(Stage::Clean, no_params(&invocation)?)
}

pub fn handle_config(invocation: Invocation) -> Result<()> {
    request(Stage::Config, no_params(&invocation)?)
}

pub fn handle_build(invocation: Invocation) -> Result<()> {
    request(Stage::Build, build_params(&invocation)?)
}

pub fn handle_run(invocation: Invocation) -> Result<()> {
    request(Stage::Run, run_params(&invocation)?)
}

pub fn handle_test(invocation: Invocation) -> Result<()> {
    request(Stage::Test, test_params(&invocation)?)
}

pub fn handle_cov(invocation: Invocation) -> Result<()> {
    request(Stage::Cov, test_params(&invocation)?)
}

pub fn handle_install(invocation: Invocation) -> Result<()> {
    request(Stage::Install, no_params(&invocation)?)
}

pub fn handle_pack(invocation: Invocation) -> Result<()> {
    request(Stage::Pack, no_params(&invocation)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(reuse_last: bool, args: &[&str]) -> Invocation {
        Invocation {
            reuse_last,
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_build_targets_replace_stored_ones() {
        let params = build_params(&invocation(false, &["app", "tests"])).unwrap();
        assert_eq!(
            params.build_targets,
            Some(vec!["app".to_string(), "tests".to_string()])
        );
        // An explicit empty build resets to the default target.
        assert_eq!(
            build_params(&invocation(false, &[])).unwrap().build_targets,
            Some(Vec::new())
        );
    }

    #[test]
    fn test_reuse_marker_keeps_stored_values() {
        assert_eq!(build_params(&invocation(true, &[])).unwrap().build_targets, None);
        let params = run_params(&invocation(true, &[])).unwrap();
        assert_eq!(params.launch_target, None);
        assert_eq!(params.launch_args, None);
        assert_eq!(test_params(&invocation(true, &[])).unwrap().test_args, None);
    }

    #[test]
    fn test_reuse_marker_with_new_values_replaces() {
        let params = run_params(&invocation(true, &["app", "--", "-v"])).unwrap();
        assert_eq!(params.launch_target.as_deref(), Some("app"));
        assert_eq!(params.launch_args, Some(vec!["-v".to_string()]));
    }

    #[test]
    fn test_run_requires_target_without_reuse() {
        assert!(run_params(&invocation(false, &[])).is_err());
        let params = run_params(&invocation(false, &["intro"])).unwrap();
        assert_eq!(params.launch_target.as_deref(), Some("intro"));
        assert_eq!(params.launch_args, Some(Vec::new()));
    }

    #[test]
    fn test_test_args_follow_double_dash() {
        let params = test_params(&invocation(false, &["--", "-R", "unit"])).unwrap();
        assert_eq!(
            params.test_args,
            Some(vec!["-R".to_string(), "unit".to_string()])
        );
    }

    #[test]
    fn test_stray_arguments_are_rejected() {
        assert!(no_params(&invocation(false, &["extra"])).is_err());
        assert!(test_params(&invocation(false, &["positional"])).is_err());
    }
}
