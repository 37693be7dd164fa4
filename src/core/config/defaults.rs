use crate::core::config::data::{LlmSettings, McpSettings, UiSettings};

pub const DEFAULT_MCP_ENDPOINT: &str = "ws://localhost:8080/mcp";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TOOL_CALL_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_LLM_PROVIDER: &str = "google";
pub const DEFAULT_LLM_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            auth_token: String::new(),
            auto_reconnect: true,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            reconnect_max_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            tool_call_timeout_secs: DEFAULT_TOOL_CALL_TIMEOUT_SECS,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            api_key: String::new(),
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            streaming: true,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}
