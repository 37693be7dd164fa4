//! LLM provider variants and their request/response strategies.
//!
//! Every provider maps to one static [`ProviderStrategy`] so request building
//! and field extraction are chosen exhaustively from the [`Provider`] enum.

use crate::api::{ChatMessage, ChatRequest, GeminiContent, GeminiPart, GeminiRequest, GenerationConfig};
use crate::core::config::LlmSettings;
use crate::core::llm_error::LlmError;
use crate::utils::auth::auth_headers;
use crate::utils::url::{construct_api_url, with_query_param};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const LOCAL_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    OpenAi,
    Anthropic,
    Local,
    Custom,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Google,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Local,
        Provider::Custom,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Local => "local",
            Provider::Custom => "custom",
        }
    }

    pub fn requires_api_key(self) -> bool {
        !matches!(self, Provider::Local)
    }

    /// Endpoint used when the settings leave `base_url` empty.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Provider::Google => Some(GOOGLE_BASE_URL),
            Provider::OpenAi => Some(OPENAI_BASE_URL),
            Provider::Anthropic => Some(ANTHROPIC_BASE_URL),
            Provider::Local => Some(LOCAL_BASE_URL),
            Provider::Custom => None,
        }
    }

    /// Environment variable consulted when no key is stored.
    pub fn env_key_var(self) -> Option<&'static str> {
        match self {
            Provider::Google => Some("GEMINI_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Local | Provider::Custom => None,
        }
    }

    pub fn strategy(self) -> &'static ProviderStrategy {
        match self {
            Provider::Google => &GOOGLE,
            Provider::OpenAi | Provider::Local | Provider::Custom => &OPENAI_COMPATIBLE,
            Provider::Anthropic => &ANTHROPIC,
        }
    }

    /// Build the HTTP request, failing before any I/O when a key is missing.
    pub fn build_request(self, params: &RequestParams<'_>) -> Result<LlmRequest, LlmError> {
        if self.requires_api_key() && params.api_key.trim().is_empty() {
            return Err(LlmError::MissingCredential {
                provider: self.id().to_string(),
            });
        }
        (self.strategy().build_request)(self, params)
    }

    /// Pull the reply text out of a complete (non-streaming) response body.
    pub fn extract_response(self, value: &Value) -> Option<String> {
        (self.strategy().extract_response)(value)
            .or_else(|| string_at(value, "/message"))
            .or_else(|| string_at(value, "/response"))
    }

    /// Pull the incremental text out of one streamed event payload.
    pub fn extract_delta(self, value: &Value) -> Option<String> {
        (self.strategy().extract_delta)(value).or_else(|| string_at(value, "/content"))
    }

    /// Anthropic always uses its fixed endpoint; the others honour a
    /// configured URL and fall back to [`Provider::default_base_url`].
    fn base_url<'a>(self, configured: &'a str) -> Result<&'a str, LlmError> {
        let configured = configured.trim();
        if self != Provider::Anthropic && !configured.is_empty() {
            return Ok(configured);
        }
        self.default_base_url().ok_or_else(|| LlmError::MissingBaseUrl {
            provider: self.id().to_string(),
        })
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|provider| provider.id() == normalized)
            .ok_or_else(|| LlmError::UnsupportedProvider(s.trim().to_string()))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Inputs for one completion request.
#[derive(Debug, Clone)]
pub struct RequestParams<'a> {
    pub base_url: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
}

impl<'a> RequestParams<'a> {
    pub fn from_settings(settings: &'a LlmSettings, prompt: &'a str) -> Self {
        Self {
            base_url: &settings.base_url,
            api_key: &settings.api_key,
            model: &settings.model,
            prompt,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            stream: settings.streaming,
        }
    }
}

/// A fully built request, ready to hand to an HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

pub struct ProviderStrategy {
    pub build_request: fn(Provider, &RequestParams<'_>) -> Result<LlmRequest, LlmError>,
    pub extract_response: fn(&Value) -> Option<String>,
    pub extract_delta: fn(&Value) -> Option<String>,
}

static GOOGLE: ProviderStrategy = ProviderStrategy {
    build_request: build_google_request,
    extract_response: extract_google_text,
    extract_delta: extract_google_text,
};

static OPENAI_COMPATIBLE: ProviderStrategy = ProviderStrategy {
    build_request: build_chat_completions_request,
    extract_response: |value| string_at(value, "/choices/0/message/content"),
    extract_delta: |value| string_at(value, "/choices/0/delta/content"),
};

static ANTHROPIC: ProviderStrategy = ProviderStrategy {
    build_request: build_anthropic_request,
    extract_response: |value| string_at(value, "/content/0/text"),
    extract_delta: |value| string_at(value, "/delta/text"),
};

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_owned)
}

fn extract_google_text(value: &Value) -> Option<String> {
    string_at(value, "/candidates/0/content/parts/0/text")
}

fn to_body<T: serde::Serialize>(body: &T) -> Result<Value, LlmError> {
    serde_json::to_value(body).map_err(|err| LlmError::InvalidResponse(err.to_string()))
}

fn build_google_request(provider: Provider, params: &RequestParams<'_>) -> Result<LlmRequest, LlmError> {
    let base_url = provider.base_url(params.base_url)?;
    let url = if params.stream {
        let url = construct_api_url(
            base_url,
            &format!("models/{}:streamGenerateContent", params.model),
        );
        with_query_param(&url, "alt", "sse").map_err(LlmError::InvalidResponse)?
    } else {
        construct_api_url(base_url, &format!("models/{}:generateContent", params.model))
    };
    let url = with_query_param(&url, "key", params.api_key.trim()).map_err(LlmError::InvalidResponse)?;

    let body = to_body(&GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart {
                text: params.prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            max_output_tokens: params.max_tokens,
            temperature: params.temperature,
        },
    })?;

    Ok(LlmRequest {
        url,
        headers: auth_headers(provider, params.api_key),
        body,
    })
}

fn chat_body(params: &RequestParams<'_>) -> Result<Value, LlmError> {
    to_body(&ChatRequest {
        model: params.model.to_string(),
        messages: vec![ChatMessage::user(params.prompt)],
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        stream: params.stream,
    })
}

fn build_chat_completions_request(
    provider: Provider,
    params: &RequestParams<'_>,
) -> Result<LlmRequest, LlmError> {
    let base_url = provider.base_url(params.base_url)?;
    Ok(LlmRequest {
        url: construct_api_url(base_url, "chat/completions"),
        headers: auth_headers(provider, params.api_key),
        body: chat_body(params)?,
    })
}

fn build_anthropic_request(provider: Provider, params: &RequestParams<'_>) -> Result<LlmRequest, LlmError> {
    let base_url = provider.base_url(params.base_url)?;
    Ok(LlmRequest {
        url: construct_api_url(base_url, "messages"),
        headers: auth_headers(provider, params.api_key),
        body: chat_body(params)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params<'a>(base_url: &'a str, api_key: &'a str, stream: bool) -> RequestParams<'a> {
        RequestParams {
            base_url,
            api_key,
            model: "test-model",
            prompt: "2+2",
            max_tokens: 256,
            temperature: 0.5,
            stream,
        }
    }

    #[test]
    fn parses_provider_ids_case_insensitively() {
        assert_eq!("Google".parse::<Provider>(), Ok(Provider::Google));
        assert_eq!(" openai ".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!("LOCAL".parse::<Provider>(), Ok(Provider::Local));
        assert_eq!(
            "cohere".parse::<Provider>(),
            Err(LlmError::UnsupportedProvider("cohere".to_string()))
        );
    }

    #[test]
    fn every_provider_but_local_requires_a_key() {
        for provider in Provider::ALL {
            let result = provider.build_request(&params("http://localhost:9/v1", "", false));
            if provider == Provider::Local {
                assert!(result.is_ok());
            } else {
                assert_eq!(
                    result,
                    Err(LlmError::MissingCredential {
                        provider: provider.id().to_string()
                    })
                );
            }
        }
    }

    #[test]
    fn google_request_puts_key_in_query() {
        let request = Provider::Google
            .build_request(&RequestParams {
                model: "gemini-1.5-flash",
                ..params(GOOGLE_BASE_URL, "abc", false)
            })
            .expect("request");

        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent?key=abc"
        );
        assert!(request.headers.is_empty());
        assert_eq!(
            request.body,
            json!({
                "contents": [{"parts": [{"text": "2+2"}]}],
                "generationConfig": {"maxOutputTokens": 256, "temperature": 0.5}
            })
        );
    }

    #[test]
    fn google_streaming_uses_sse_endpoint() {
        let request = Provider::Google
            .build_request(&params("", "abc", true))
            .expect("request");
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/test-model:streamGenerateContent?alt=sse&key=abc"
        );
    }

    #[test]
    fn openai_request_shape() {
        let request = Provider::OpenAi
            .build_request(&params("", "sk-test", true))
            .expect("request");

        assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            request.headers,
            vec![("Authorization", "Bearer sk-test".to_string())]
        );
        assert_eq!(
            request.body,
            json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "2+2"}],
                "max_tokens": 256,
                "temperature": 0.5,
                "stream": true
            })
        );
    }

    #[test]
    fn local_defaults_to_ollama_and_skips_bearer() {
        let request = Provider::Local
            .build_request(&params("", "", false))
            .expect("request");
        assert_eq!(request.url, "http://localhost:11434/v1/chat/completions");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn custom_requires_base_url() {
        assert_eq!(
            Provider::Custom.build_request(&params("  ", "key", false)),
            Err(LlmError::MissingBaseUrl {
                provider: "custom".to_string()
            })
        );

        let request = Provider::Custom
            .build_request(&params("https://llm.example.com/v1/", "key", false))
            .expect("request");
        assert_eq!(request.url, "https://llm.example.com/v1/chat/completions");
    }

    #[test]
    fn anthropic_request_uses_messages_endpoint_and_version_header() {
        let request = Provider::Anthropic
            .build_request(&params("", "ant-key", false))
            .expect("request");
        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(
            request.headers,
            vec![
                ("x-api-key", "ant-key".to_string()),
                ("anthropic-version", "2023-06-01".to_string()),
            ]
        );
        assert_eq!(request.body["stream"], json!(false));

        let request = Provider::Anthropic
            .build_request(&params(GOOGLE_BASE_URL, "ant-key", false))
            .expect("request");
        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn extracts_google_response_text() {
        let body = json!({"candidates":[{"content":{"parts":[{"text":"4"}]}}]});
        assert_eq!(Provider::Google.extract_response(&body).as_deref(), Some("4"));
    }

    #[test]
    fn extracts_responses_per_provider_with_generic_fallback() {
        let openai = json!({"choices":[{"message":{"content":"hi"}}]});
        let anthropic = json!({"content":[{"type":"text","text":"hey"}]});
        let generic = json!({"response":"fallback"});

        assert_eq!(Provider::OpenAi.extract_response(&openai).as_deref(), Some("hi"));
        assert_eq!(Provider::Anthropic.extract_response(&anthropic).as_deref(), Some("hey"));
        assert_eq!(Provider::Local.extract_response(&generic).as_deref(), Some("fallback"));
        assert_eq!(
            Provider::Custom
                .extract_response(&json!({"message":"plain"}))
                .as_deref(),
            Some("plain")
        );
        assert_eq!(Provider::Google.extract_response(&json!({})), None);
    }

    #[test]
    fn extracts_deltas_per_provider() {
        assert_eq!(
            Provider::OpenAi
                .extract_delta(&json!({"choices":[{"delta":{"content":"Hel"}}]}))
                .as_deref(),
            Some("Hel")
        );
        assert_eq!(
            Provider::Anthropic
                .extract_delta(&json!({"type":"content_block_delta","delta":{"text":"lo"}}))
                .as_deref(),
            Some("lo")
        );
        assert_eq!(
            Provider::Google
                .extract_delta(&json!({"candidates":[{"content":{"parts":[{"text":"x"}]}}]}))
                .as_deref(),
            Some("x")
        );
        assert_eq!(
            Provider::Local.extract_delta(&json!({"content":"raw"})).as_deref(),
            Some("raw")
        );
        assert_eq!(
            Provider::OpenAi.extract_delta(&json!({"choices":[{"delta":{}}]})),
            None
        );
    }
}
