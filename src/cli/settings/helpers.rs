//! Helper functions for settings operations.

use std::str::FromStr;

use crate::core::providers::Provider;

use super::error::SettingError;

/// Parse a boolean value from user input.
///
/// Accepts: on/off, true/false, yes/no (case-insensitive).
pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Format a boolean value for display.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Resolve a provider identifier to its canonical form.
pub fn validate_provider(input: &str) -> Result<Provider, SettingError> {
    Provider::from_str(input).map_err(|_| SettingError::UnknownProvider {
        input: input.to_string(),
    })
}

/// Join the arguments after the key, or report what was expected.
pub fn require_value(
    args: &[String],
    hint: &'static str,
    example: &'static str,
) -> Result<String, SettingError> {
    let value = args.join(" ");
    if value.trim().is_empty() {
        return Err(SettingError::MissingArgs { hint, example });
    }
    Ok(value.trim().to_string())
}

/// Accept `llm.max_tokens`, `llm.max-tokens` and `LLM.Max-Tokens` alike.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('_', "-")
}

pub fn success_set(key: &str, value: &str) -> String {
    format!("✅ Set {key} to: {value}")
}
