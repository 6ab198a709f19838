// src/core/toolchain_options.rs

use crate::models::{OptionValue, ToolchainOption};
use anyhow::{Result, anyhow};

/// Renders options as build-file generator cache definitions:
/// `-D<NAME>:BOOL=ON|OFF` for booleans, `-D<NAME>:STRING=<value>` otherwise.
pub fn render_definitions(options: &[ToolchainOption]) -> Vec<String> {
    options
        .iter()
        .map(|opt| {
            let kind = match opt.value {
                OptionValue::Bool(_) => "BOOL",
                OptionValue::Text(_) => "STRING",
            };
            format!("-D{}:{}={}", opt.name, kind, opt.value)
        })
        .collect()
}

/// Parses a user-supplied option value. Common boolean spellings become
/// booleans; anything else is kept as text.
pub fn parse_value(raw: &str) -> OptionValue {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => OptionValue::Bool(true),
        "off" | "false" | "no" | "0" => OptionValue::Bool(false),
        _ => OptionValue::Text(raw.to_string()),
    }
}

/// Parses `NAME=VALUE`.
pub fn parse_assignment(input: &str) -> Result<ToolchainOption> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'.", input))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(anyhow!("Invalid option name '{}'.", name));
    }
    Ok(ToolchainOption::new(name, parse_value(value)))
}
