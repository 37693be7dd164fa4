//! Boolean setting handlers for on/off settings.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{format_bool, parse_bool, require_value, success_set};
use crate::cli::settings::SettingHandler;
use crate::core::config::Settings;

/// Data-driven handler for boolean (on/off) settings.
pub struct BooleanHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    get: fn(&Settings) -> bool,
    set_field: fn(&mut Settings, bool),
}

impl SettingHandler for BooleanHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], settings: &mut Settings) -> Result<String, SettingError> {
        let input = require_value(args, self.hint, self.example)?;
        let value = parse_bool(&input).ok_or(SettingError::InvalidBoolean(input))?;
        (self.set_field)(settings, value);
        Ok(success_set(self.key, format_bool(value)))
    }

    fn format(&self, settings: &Settings) -> String {
        format!("  {}: {}", self.key, format_bool((self.get)(settings)))
    }
}

pub fn auto_reconnect_handler() -> BooleanHandler {
    BooleanHandler {
        key: "mcp.auto-reconnect",
        hint: "To toggle reconnecting after unexpected disconnects, specify on or off:",
        example: "mcp-chat config set mcp.auto-reconnect off",
        get: |s| s.mcp.auto_reconnect,
        set_field: |s, v| s.mcp.auto_reconnect = v,
    }
}

pub fn streaming_handler() -> BooleanHandler {
    BooleanHandler {
        key: "llm.streaming",
        hint: "To toggle streamed replies, specify on or off:",
        example: "mcp-chat config set llm.streaming off",
        get: |s| s.llm.streaming,
        set_field: |s, v| s.llm.streaming = v,
    }
}

pub fn notifications_handler() -> BooleanHandler {
    BooleanHandler {
        key: "ui.notifications",
        hint: "To toggle MCP notifications in chat, specify on or off:",
        example: "mcp-chat config set ui.notifications off",
        get: |s| s.ui.notifications,
        set_field: |s, v| s.ui.notifications = v,
    }
}
