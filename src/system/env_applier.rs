// src/system/env_applier.rs

use std::collections::BTreeMap;
use thiserror::Error;

use crate::system::env_capture::EnvironmentDiff;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Environment variable '{name}' cannot be set: {reason}")]
    Unrepresentable { name: String, reason: &'static str },
}

/// A mutable set of environment variables.
pub trait Environment {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: &str);
}

/// The environment of the running process. Child processes spawned afterwards
/// inherit whatever is applied here.
#[derive(Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set(&mut self, name: &str, value: &str) {
        // SAFETY: pipewright is single-threaded; no other thread reads or
        // writes the environment while an action runs.
        unsafe { std::env::set_var(name, value) };
    }
}

/// An in-memory environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapEnvironment {
    pub vars: BTreeMap<String, String>,
}

impl MapEnvironment {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Environment for MapEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }
}

/// Overwrites every variable named in `diff`. Nothing outside the diff is
/// touched. The whole diff is validated before the first variable is set.
pub fn apply(diff: &EnvironmentDiff, env: &mut dyn Environment) -> Result<(), ApplyError> {
    for (name, value) in diff.iter() {
        validate(name, value)?;
    }
    for (name, value) in diff.iter() {
        log::trace!("set {}={}", name, value);
        env.set(name, value);
    }
    log::debug!("Applied {} environment variable(s).", diff.len());
    Ok(())
}

fn validate(name: &str, value: &str) -> Result<(), ApplyError> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.contains('=') {
        Some("name contains '='")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else if value.contains('\0') {
        Some("value contains a NUL byte")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ApplyError::Unrepresentable {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
