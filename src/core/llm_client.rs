use tracing::debug;

use crate::core::chat_stream::decode;
use crate::core::config::LlmSettings;
use crate::core::llm_error::LlmError;
use crate::core::providers::{LlmRequest, Provider, RequestParams};
use crate::utils::auth::add_headers;

pub const TEST_PROMPT: &str = "Test connection";
const TEST_MAX_TOKENS: u32 = 10;

/// Issues completion requests against whichever provider the settings name.
#[derive(Clone, Default)]
pub struct LlmClient {
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send `message` and return the reply text.
    ///
    /// With streaming enabled each delta reaches `on_delta` as it arrives;
    /// otherwise `on_delta` is never called.
    pub async fn complete<F>(
        &self,
        message: &str,
        settings: &LlmSettings,
        on_delta: F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let params = RequestParams::from_settings(settings, message);
        self.fetch_text(settings.provider()?, &params, on_delta)
            .await?
            .ok_or_else(|| LlmError::InvalidResponse("response contained no message text".to_string()))
    }

    /// Round-trip a tiny, deterministic prompt to prove the credentials work.
    pub async fn test_connection(&self, settings: &LlmSettings) -> Result<String, LlmError> {
        let params = RequestParams {
            max_tokens: TEST_MAX_TOKENS,
            temperature: 0.0,
            stream: false,
            ..RequestParams::from_settings(settings, TEST_PROMPT)
        };
        match self.fetch_text(settings.provider()?, &params, |_| {}).await? {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(LlmError::EmptyResponse),
        }
    }

    async fn fetch_text<F>(
        &self,
        provider: Provider,
        params: &RequestParams<'_>,
        on_delta: F,
    ) -> Result<Option<String>, LlmError>
    where
        F: FnMut(&str),
    {
        let LlmRequest { url, headers, body } = provider.build_request(params)?;
        debug!(provider = %provider, model = params.model, stream = params.stream, "Sending LLM request");

        let request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let response = add_headers(request, &headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            debug!(provider = %provider, status = status.as_u16(), "LLM request failed");
            return Err(LlmError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        if params.stream {
            return decode(response.bytes_stream(), provider, on_delta)
                .await
                .map(Some);
        }

        let text = response.text().await?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        Ok(provider.extract_response(&value))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    pub type CapturedRequests = Arc<Mutex<Vec<(String, Vec<(String, String)>, Vec<u8>)>>>;

    async fn read_http_request(
        stream: &mut tokio::net::TcpStream,
    ) -> Result<(String, Vec<(String, String)>, Vec<u8>), String> {
        let mut buffer = Vec::new();
        let mut header_end = None;
        while header_end.is_none() {
            let mut chunk = [0_u8; 1024];
            let read = stream
                .read(&mut chunk)
                .await
                .map_err(|err| err.to_string())?;
            if read == 0 {
                return Err("Unexpected EOF while reading HTTP headers".to_string());
            }
            buffer.extend_from_slice(&chunk[..read]);
            header_end = buffer
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
                .map(|index| index + 4);
        }

        let header_end = header_end.expect("header end should exist");
        let header_text =
            std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
        let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
        let request_line = lines
            .next()
            .ok_or_else(|| "Missing HTTP request line".to_string())?
            .to_string();

        let mut headers = Vec::new();
        let mut content_length = 0_usize;
        for line in lines {
            let mut parts = line.splitn(2, ':');
            let Some(name) = parts.next() else {
                continue;
            };
            let value = parts.next().unwrap_or_default().trim().to_string();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
            }
            headers.push((name.to_ascii_lowercase(), value));
        }

        let mut body = buffer[header_end..].to_vec();
        while body.len() < content_length {
            let mut chunk = vec![0_u8; content_length - body.len()];
            let read = stream
                .read(&mut chunk)
                .await
                .map_err(|err| err.to_string())?;
            if read == 0 {
                return Err("Unexpected EOF while reading HTTP body".to_string());
            }
            body.extend_from_slice(&chunk[..read]);
        }
        body.truncate(content_length);

        Ok((request_line, headers, body))
    }

    /// Serve one canned response per connection and record what was sent.
    pub async fn spawn_http_server(responses: Vec<(u16, &'static str, String)>) -> (String, CapturedRequests) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        let captured: CapturedRequests = Arc::new(Mutex::new(Vec::new()));
        let captured_for_server = Arc::clone(&captured);

        tokio::spawn(async move {
            for (status, content_type, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(request) = read_http_request(&mut stream).await else {
                    return;
                };
                captured_for_server.lock().await.push(request);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{addr}/v1"), captured)
    }
}
