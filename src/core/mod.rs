// src/core/mod.rs

pub mod lifecycle;
pub mod paths;
pub mod pipeline;
pub mod presets;
pub mod settings;
pub mod toolchain_options;
