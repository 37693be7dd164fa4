//! URL helpers shared by the LLM client and the MCP connection layer.

/// Strip trailing slashes so endpoint paths can be appended safely.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without producing double slashes.
///
/// ```
/// use mcp_chat_relay::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Append a single query parameter, percent-encoding the value.
pub fn with_query_param(url: &str, key: &str, value: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| format!("Invalid URL {url}: {err}"))?;
    parsed.query_pairs_mut().append_pair(key, value);
    Ok(parsed.into())
}

/// True for URLs a WebSocket client can dial.
pub fn is_websocket_url(url: &str) -> bool {
    let lowered = url.trim().to_ascii_lowercase();
    lowered.starts_with("ws://") || lowered.starts_with("wss://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_trailing_slashes_and_whitespace() {
        assert_eq!(
            normalize_base_url("https://generativelanguage.googleapis.com/v1beta//"),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(normalize_base_url("  http://localhost:11434/v1/ "), "http://localhost:11434/v1");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn construct_api_url_handles_slash_combinations() {
        let cases = [
            ("http://localhost:11434/v1", "chat/completions"),
            ("http://localhost:11434/v1/", "chat/completions"),
            ("http://localhost:11434/v1", "/chat/completions"),
            ("http://localhost:11434/v1///", "///chat/completions"),
        ];
        for (base, endpoint) in cases {
            assert_eq!(
                construct_api_url(base, endpoint),
                "http://localhost:11434/v1/chat/completions"
            );
        }
    }

    #[test]
    fn with_query_param_encodes_value() {
        let url = with_query_param(
            "https://example.com/models/gemini-1.5-flash:generateContent",
            "key",
            "a b&c",
        )
        .expect("valid url");
        assert_eq!(
            url,
            "https://example.com/models/gemini-1.5-flash:generateContent?key=a+b%26c"
        );
    }

    #[test]
    fn with_query_param_rejects_relative_urls() {
        assert!(with_query_param("/models/x", "key", "k").is_err());
    }

    #[test]
    fn websocket_url_detection() {
        assert!(is_websocket_url("ws://localhost:8080/mcp"));
        assert!(is_websocket_url("WSS://bridge.example.com"));
        assert!(!is_websocket_url("http://localhost:8080/mcp"));
        assert!(!is_websocket_url(""));
    }
}
