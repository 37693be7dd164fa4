//! Authentication utilities for LLM requests
//!
//! Providers disagree on where the key goes:
//! - Anthropic: `x-api-key` header with `anthropic-version`
//! - Google: `key` query parameter, so no header at all
//! - Everything else: standard `Authorization: Bearer` header

use crate::core::providers::Provider;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build the provider-specific authentication headers for `api_key`.
///
/// An empty key yields no bearer header, which is how `local` servers that
/// need no credentials are reached.
pub fn auth_headers(provider: Provider, api_key: &str) -> Vec<(&'static str, String)> {
    let api_key = api_key.trim();
    match provider {
        Provider::Anthropic => vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
        Provider::Google => Vec::new(),
        Provider::OpenAi | Provider::Local | Provider::Custom => {
            if api_key.is_empty() {
                Vec::new()
            } else {
                vec![("Authorization", format!("Bearer {api_key}"))]
            }
        }
    }
}

/// Apply headers produced by [`auth_headers`] (or any provider header list) to a request.
pub fn add_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[(&'static str, String)],
) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    request
}
