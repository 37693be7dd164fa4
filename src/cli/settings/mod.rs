//! Settings management for `config set` / `config show`.
//!
//! Each key is served by a [`SettingHandler`]:
//!
//! - Text settings (e.g., `mcp.endpoint`, `llm.model`), secrets masked on display
//! - Boolean settings (e.g., `mcp.auto-reconnect`, `llm.streaming`)
//! - Numeric settings (e.g., `llm.max-tokens`, `mcp.ping-interval`)
//! - `llm.provider`, which also resets the base URL

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod registry;

pub use error::SettingError;
pub use registry::SettingRegistry;

use crate::core::config::Settings;
use helpers::normalize_key;

/// Trait for handling a configuration setting.
pub trait SettingHandler: Send + Sync {
    /// Returns the configuration key this handler manages.
    fn key(&self) -> &'static str;

    /// Apply the arguments given after the key to `settings`.
    ///
    /// Returns a success message to display. Nothing is persisted here.
    fn set(&self, args: &[String], settings: &mut Settings) -> Result<String, SettingError>;

    /// Format the current value for display in `config show` output.
    fn format(&self, settings: &Settings) -> String;
}

/// Set `key` on a copy of `settings`, rejecting values that fail validation.
///
/// A missing API key is allowed so keys can be set in any order; callers
/// should warn when [`Settings::validate`] still fails.
pub fn apply_setting(
    registry: &SettingRegistry,
    settings: &Settings,
    key: &str,
    args: &[String],
) -> Result<(Settings, String), SettingError> {
    let key = normalize_key(key);
    let handler = registry
        .get(&key)
        .ok_or_else(|| SettingError::UnknownKey(key.clone()))?;

    let mut updated = settings.clone();
    let message = handler.set(args, &mut updated)?;
    updated
        .validate_values()
        .map_err(|err| SettingError::Invalid(err.to_string()))?;
    Ok((updated, message))
}

/// One line per key, in display order.
pub fn format_all(registry: &SettingRegistry, settings: &Settings) -> Vec<String> {
    registry
        .keys_display_order()
        .iter()
        .filter_map(|key| registry.get(key))
        .map(|handler| handler.format(settings))
        .collect()
}
