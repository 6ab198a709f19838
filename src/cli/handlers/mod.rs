// src/cli/handlers/mod.rs

// One module per action family.

pub mod commons;
pub mod option;
pub mod setup;
pub mod stages;
pub mod status;
