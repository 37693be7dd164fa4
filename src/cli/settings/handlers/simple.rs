//! Text, secret and numeric setting handlers.

use std::fmt::Display;
use std::str::FromStr;

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{require_value, success_set, validate_provider};
use crate::cli::settings::SettingHandler;
use crate::core::config::data::mask_secret;
use crate::core::config::Settings;

/// Free-form text; `secret` values are masked when shown.
pub struct TextHandler {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    secret: bool,
    get: fn(&Settings) -> &str,
    set_field: fn(&mut Settings, String),
}

impl SettingHandler for TextHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], settings: &mut Settings) -> Result<String, SettingError> {
        // An explicit empty string clears optional values.
        let value = match args {
            [only] if only.is_empty() || only == "\"\"" => String::new(),
            _ => require_value(args, self.hint, self.example)?,
        };
        let shown = self.display(&value);
        (self.set_field)(settings, value);
        Ok(success_set(self.key, &shown))
    }

    fn format(&self, settings: &Settings) -> String {
        format!("  {}: {}", self.key, self.display((self.get)(settings)))
    }
}

impl TextHandler {
    fn display(&self, value: &str) -> String {
        if self.secret {
            mask_secret(value)
        } else if value.is_empty() {
            "(unset)".to_string()
        } else {
            value.to_string()
        }
    }
}

pub fn endpoint_handler() -> TextHandler {
    TextHandler {
        key: "mcp.endpoint",
        hint: "To set the MCP bridge, specify a ws:// or wss:// URL:",
        example: "mcp-chat config set mcp.endpoint ws://localhost:8080/mcp",
        secret: false,
        get: |s| s.mcp.endpoint.as_str(),
        set_field: |s, v| s.mcp.endpoint = v,
    }
}

pub fn auth_token_handler() -> TextHandler {
    TextHandler {
        key: "mcp.auth-token",
        hint: "To set the MCP auth token, specify it:",
        example: "mcp-chat config set mcp.auth-token my-token",
        secret: true,
        get: |s| s.mcp.auth_token.as_str(),
        set_field: |s, v| s.mcp.auth_token = v,
    }
}

pub fn api_key_handler() -> TextHandler {
    TextHandler {
        key: "llm.api-key",
        hint: "To set the LLM API key, specify it:",
        example: "mcp-chat config set llm.api-key sk-...",
        secret: true,
        get: |s| s.llm.api_key.as_str(),
        set_field: |s, v| s.llm.api_key = v,
    }
}

pub fn model_handler() -> TextHandler {
    TextHandler {
        key: "llm.model",
        hint: "To set the model, specify its name:",
        example: "mcp-chat config set llm.model gpt-4o-mini",
        secret: false,
        get: |s| s.llm.model.as_str(),
        set_field: |s, v| s.llm.model = v,
    }
}

pub fn base_url_handler() -> TextHandler {
    TextHandler {
        key: "llm.base-url",
        hint: "To set the API base URL, specify it (\"\" for the provider default):",
        example: "mcp-chat config set llm.base-url http://localhost:11434/v1",
        secret: false,
        get: |s| s.llm.base_url.as_str(),
        set_field: |s, v| s.llm.base_url = v,
    }
}

/// Any value parsed with `FromStr`, e.g. timeouts in seconds.
pub struct NumberHandler<T> {
    key: &'static str,
    hint: &'static str,
    example: &'static str,
    suffix: &'static str,
    get: fn(&Settings) -> T,
    set_field: fn(&mut Settings, T),
}

impl<T> SettingHandler for NumberHandler<T>
where
    T: FromStr + Display + Copy + Send + Sync,
{
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], settings: &mut Settings) -> Result<String, SettingError> {
        let input = require_value(args, self.hint, self.example)?;
        let value = input.parse::<T>().map_err(|_| SettingError::InvalidNumber {
            key: self.key,
            input: input.clone(),
        })?;
        (self.set_field)(settings, value);
        Ok(success_set(self.key, &format!("{value}{}", self.suffix)))
    }

    fn format(&self, settings: &Settings) -> String {
        format!("  {}: {}{}", self.key, (self.get)(settings), self.suffix)
    }
}

pub fn seconds_handlers() -> Vec<NumberHandler<u64>> {
    vec![
        NumberHandler {
            key: "mcp.connect-timeout",
            hint: "To set the connect timeout, specify seconds:",
            example: "mcp-chat config set mcp.connect-timeout 10",
            suffix: "s",
            get: |s| s.mcp.connect_timeout_secs,
            set_field: |s, v| s.mcp.connect_timeout_secs = v,
        },
        NumberHandler {
            key: "mcp.reconnect-delay",
            hint: "To set the first reconnect delay, specify seconds:",
            example: "mcp-chat config set mcp.reconnect-delay 5",
            suffix: "s",
            get: |s| s.mcp.reconnect_delay_secs,
            set_field: |s, v| s.mcp.reconnect_delay_secs = v,
        },
        NumberHandler {
            key: "mcp.reconnect-max-delay",
            hint: "To cap the reconnect backoff, specify seconds:",
            example: "mcp-chat config set mcp.reconnect-max-delay 60",
            suffix: "s",
            get: |s| s.mcp.reconnect_max_delay_secs,
            set_field: |s, v| s.mcp.reconnect_max_delay_secs = v,
        },
        NumberHandler {
            key: "mcp.ping-interval",
            hint: "To set the keep-alive interval, specify seconds:",
            example: "mcp-chat config set mcp.ping-interval 30",
            suffix: "s",
            get: |s| s.mcp.ping_interval_secs,
            set_field: |s, v| s.mcp.ping_interval_secs = v,
        },
        NumberHandler {
            key: "mcp.tool-call-timeout",
            hint: "To set the tool call timeout, specify seconds:",
            example: "mcp-chat config set mcp.tool-call-timeout 30",
            suffix: "s",
            get: |s| s.mcp.tool_call_timeout_secs,
            set_field: |s, v| s.mcp.tool_call_timeout_secs = v,
        },
    ]
}

pub fn max_tokens_handler() -> NumberHandler<u32> {
    NumberHandler {
        key: "llm.max-tokens",
        hint: "To set the reply length limit, specify a number of tokens:",
        example: "mcp-chat config set llm.max-tokens 4096",
        suffix: "",
        get: |s| s.llm.max_tokens,
        set_field: |s, v| s.llm.max_tokens = v,
    }
}

pub fn temperature_handler() -> NumberHandler<f64> {
    NumberHandler {
        key: "llm.temperature",
        hint: "To set the sampling temperature, specify a value between 0 and 2:",
        example: "mcp-chat config set llm.temperature 0.2",
        suffix: "",
        get: |s| s.llm.temperature,
        set_field: |s, v| s.llm.temperature = v,
    }
}

/// Handler for `llm.provider`. Switching provider also clears the base URL,
/// so the new provider's default endpoint applies.
pub struct ProviderHandler;

impl SettingHandler for ProviderHandler {
    fn key(&self) -> &'static str {
        "llm.provider"
    }

    fn set(&self, args: &[String], settings: &mut Settings) -> Result<String, SettingError> {
        let input = require_value(
            args,
            "To set the LLM provider, specify one of google, openai, anthropic, local, custom:",
            "mcp-chat config set llm.provider openai",
        )?;
        let provider = validate_provider(&input)?;
        if settings.llm.provider != provider.id() {
            settings.llm.base_url.clear();
        }
        settings.llm.provider = provider.id().to_string();
        Ok(success_set(self.key(), provider.id()))
    }

    fn format(&self, settings: &Settings) -> String {
        format!("  {}: {}", self.key(), settings.llm.provider)
    }
}
