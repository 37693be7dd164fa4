use crate::core::config::io::ConfigError;
use crate::core::providers::Provider;
use crate::utils::url::is_websocket_url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 100_000;
pub const MAX_TEMPERATURE: f64 = 2.0;

/// MCP bridge connection settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct McpSettings {
    /// WebSocket URL of the MCP bridge, e.g. `ws://localhost:8080/mcp`
    #[serde(alias = "url")]
    pub endpoint: String,
    /// Sent once after the socket opens as `{type:"auth", apiKey}` when non-empty
    #[serde(alias = "apiKey")]
    pub auth_token: String,
    #[serde(alias = "autoReconnect")]
    pub auto_reconnect: bool,
    pub connect_timeout_secs: u64,
    /// First reconnect delay; doubled per failed attempt up to the max
    pub reconnect_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub ping_interval_secs: u64,
    pub tool_call_timeout_secs: u64,
}

/// LLM provider settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    /// One of google, openai, anthropic, local, custom
    pub provider: String,
    #[serde(alias = "apiKey")]
    pub api_key: String,
    pub model: String,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    #[serde(alias = "maxTokens")]
    pub max_tokens: u32,
    pub temperature: f64,
    pub streaming: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UiSettings {
    /// Print MCP notifications (auth results, server errors) in the chat
    pub notifications: bool,
}

/// The single persisted settings object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub mcp: McpSettings,
    pub llm: LlmSettings,
    pub ui: UiSettings,
}

impl McpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs.max(self.reconnect_delay_secs).max(1))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs.max(1))
    }
}

impl LlmSettings {
    pub fn provider(&self) -> Result<Provider, crate::core::llm_error::LlmError> {
        Provider::from_str(&self.provider)
    }
}

impl Settings {
    /// Reject values the settings form would refuse to save.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = self.validate_values()?;
        if provider.requires_api_key() && self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "An API key is required for the {} provider",
                provider.id()
            )));
        }
        Ok(())
    }

    /// Range and format checks only; a missing API key is not an error here.
    pub fn validate_values(&self) -> Result<Provider, ConfigError> {
        let provider =
            Provider::from_str(&self.llm.provider).map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.llm.max_tokens) {
            return Err(ConfigError::Invalid(format!(
                "max_tokens must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}"
            )));
        }

        if !(0.0..=MAX_TEMPERATURE).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be between 0 and {MAX_TEMPERATURE}"
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }

        let endpoint = self.mcp.endpoint.trim();
        if !endpoint.is_empty() && !is_websocket_url(endpoint) {
            return Err(ConfigError::Invalid(format!(
                "MCP endpoint must be a ws:// or wss:// URL, got {endpoint}"
            )));
        }

        Ok(provider)
    }

    /// Fill an empty LLM key from the provider's conventional environment variable.
    pub fn apply_env_fallback(&mut self) {
        self.apply_env_fallback_with(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_env_fallback_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.llm.api_key.trim().is_empty() {
            return;
        }
        let Some(var) = Provider::from_str(&self.llm.provider)
            .ok()
            .and_then(Provider::env_key_var)
        else {
            return;
        };
        if let Some(value) = lookup(var).filter(|value| !value.trim().is_empty()) {
            self.llm.api_key = value;
        }
    }
}

/// Get a user-friendly display string for a path, using `~` for the home directory.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

/// Show only the last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = trimmed
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{visible}")
}
