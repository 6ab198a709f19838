//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the underlying operating system.
//! It is the boundary between the lifecycle logic and process management, shells and the
//! process environment.
//!
//! ## Modules
//!
//! - **`executor`**: Structured commands (program + argument list) and the `ProcessRunner`
//!   trait used to spawn them, with a real `SystemRunner` implementation.
//! - **`env_capture`**: Runs an opaque activation command in a disposable subshell and diffs
//!   the environment listings taken before and after it.
//! - **`path_normalizer`**: Deduplicates path-list variables and, on Windows, shortens
//!   segments containing spaces.
//! - **`env_applier`**: Replays a captured diff into an `Environment`.
//! - **`platform`**: Delimiters and path-list variable names per platform.
//! - **`shells_config`**: The shell used for environment capture.

pub mod env_applier;
pub mod env_capture;
pub mod executor;
pub mod path_normalizer;
pub mod platform;
pub mod shells_config;
