use std::fmt;

use futures_util::{pin_mut, Stream, StreamExt};
use memchr::memchr;
use tracing::debug;

use crate::core::llm_error::LlmError;
use crate::core::providers::Provider;

const DONE_SENTINEL: &str = "[DONE]";

/// Splits an incoming byte stream into complete lines.
///
/// Bytes after the last newline stay buffered until more data arrives or
/// [`SseLineBuffer::finish`] flushes them, so a chunk boundary can fall
/// anywhere (even inside a multi-byte character) without changing the output.
#[derive(Default, Debug)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = memchr(b'\n', &self.buffer[search_index..]) {
            let newline_index = search_index + relative_pos;
            push_line(&mut lines, &self.buffer[search_index..newline_index]);
            search_index = newline_index + 1;
        }

        if flush {
            push_line(&mut lines, &self.buffer[search_index..]);
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

fn push_line(lines: &mut Vec<String>, bytes: &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Err(err) => debug!(error = %err, "Skipping stream line with invalid UTF-8"),
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Per-response accumulator: line assembly plus the text decoded so far.
#[derive(Debug)]
pub struct StreamDecoder {
    provider: Provider,
    lines: SseLineBuffer,
    text: String,
}

impl StreamDecoder {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            lines: SseLineBuffer::default(),
            text: String::new(),
        }
    }

    /// Feed one chunk; every complete delta is passed to `on_delta` in order.
    pub fn push<F>(&mut self, chunk: &[u8], on_delta: &mut F)
    where
        F: FnMut(&str),
    {
        for line in self.lines.push(chunk) {
            self.process_line(&line, on_delta);
        }
    }

    /// Flush any trailing partial line and return the accumulated text.
    pub fn finish<F>(mut self, on_delta: &mut F) -> String
    where
        F: FnMut(&str),
    {
        for line in self.lines.finish() {
            self.process_line(&line, on_delta);
        }
        self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn process_line<F>(&mut self, line: &str, on_delta: &mut F)
    where
        F: FnMut(&str),
    {
        let Some(payload) = extract_data_payload(line) else {
            return;
        };
        if payload == DONE_SENTINEL || payload.is_empty() {
            return;
        }

        let value = match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => value,
            Err(err) => {
                debug!(provider = %self.provider, error = %err, "Skipping malformed stream frame");
                return;
            }
        };

        if let Some(delta) = self.provider.extract_delta(&value) {
            if !delta.is_empty() {
                self.text.push_str(&delta);
                on_delta(&delta);
            }
        }
    }
}

/// Drain `stream` to completion, returning the full decoded text.
///
/// The stream is owned by this call and dropped on every exit path.
pub async fn decode<S, B, E, F>(stream: S, provider: Provider, mut on_delta: F) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(&str),
{
    pin_mut!(stream);
    let mut decoder = StreamDecoder::new(provider);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => decoder.push(bytes.as_ref(), &mut on_delta),
            Err(err) => {
                debug!(provider = %provider, error = %err, "Stream read failed");
                return Err(LlmError::Transport(err.to_string()));
            }
        }
    }

    Ok(decoder.finish(&mut on_delta))
}
