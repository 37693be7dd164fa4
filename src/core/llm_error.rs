use std::error::Error as StdError;
use std::fmt;

/// Failures of a single LLM completion.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// The provider needs an API key and none is configured.
    MissingCredential { provider: String },
    UnsupportedProvider(String),
    /// `custom` has no fixed endpoint, so a base URL is mandatory.
    MissingBaseUrl { provider: String },
    HttpError { status: u16, body: String },
    Transport(String),
    InvalidResponse(String),
    /// A connectivity test produced no text.
    EmptyResponse,
}

impl LlmError {
    /// A short single-line summary suitable for a chat notice.
    pub fn summary(&self) -> String {
        match self {
            LlmError::HttpError { status, body } => match extract_error_summary(body) {
                Some(summary) if !summary.is_empty() => format!("HTTP {status}: {summary}"),
                _ => format!("HTTP {status}"),
            },
            other => other.to_string(),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::MissingCredential { provider } => {
                write!(f, "No API key configured for provider '{provider}'")
            }
            LlmError::UnsupportedProvider(provider) => {
                write!(f, "Unsupported LLM provider: {provider}")
            }
            LlmError::MissingBaseUrl { provider } => {
                write!(f, "Provider '{provider}' requires a base URL")
            }
            LlmError::HttpError { status, body } => {
                write!(f, "HTTP {status}\n{}", format_api_error(body))
            }
            LlmError::Transport(message) => write!(f, "Request failed: {message}"),
            LlmError::InvalidResponse(message) => write!(f, "Invalid response: {message}"),
            LlmError::EmptyResponse => write!(f, "Empty response from LLM"),
        }
    }
}

impl StdError for LlmError {}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

fn extract_error_summary(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(trimmed) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}
