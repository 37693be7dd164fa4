//! Matches outgoing tool calls to their asynchronous replies.
//!
//! Every registration has exactly one removal path: a matching reply, the
//! per-call timeout (or the caller giving up), or [`ToolCallCorrelator::fail_all`]
//! when the connection closes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::mcp::error::McpError;
use crate::mcp::protocol::{ClientFrame, ToolResponse};

type ToolOutcome = Result<Value, McpError>;

#[derive(Debug)]
pub struct PendingToolCall {
    pub request_id: String,
    pub tool_name: String,
    pub parameters: Value,
    pub issued_at: Instant,
    sequence: u64,
    responder: oneshot::Sender<ToolOutcome>,
}

#[derive(Debug)]
pub struct ToolCallCorrelator {
    prefix: String,
    next_sequence: AtomicU64,
    pending: Mutex<HashMap<String, PendingToolCall>>,
    timeout: Duration,
}

/// Removes the registration if the awaiting future is dropped or times out.
struct PendingGuard<'a> {
    correlator: &'a ToolCallCorrelator,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.lock().remove(self.request_id);
    }
}

impl ToolCallCorrelator {
    /// `prefix` keeps ids from different connections apart in logs.
    pub fn new(prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            next_sequence: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingToolCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call, hand its frame to `send`, and wait for the reply.
    pub async fn call<F>(&self, tool_name: &str, parameters: Value, send: F) -> ToolOutcome
    where
        F: FnOnce(ClientFrame) -> Result<(), McpError>,
    {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let request_id = format!("{}-{sequence}", self.prefix);
        let (tx, rx) = oneshot::channel();

        self.lock().insert(
            request_id.clone(),
            PendingToolCall {
                request_id: request_id.clone(),
                tool_name: tool_name.to_string(),
                parameters: parameters.clone(),
                issued_at: Instant::now(),
                sequence,
                responder: tx,
            },
        );
        let _guard = PendingGuard {
            correlator: self,
            request_id: &request_id,
        };

        debug!(request_id = %request_id, tool_name, "Sending MCP tool call");
        send(ClientFrame::CallTool {
            id: request_id.clone(),
            tool_name: tool_name.to_string(),
            parameters,
        })?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                debug!(
                    request_id = %request_id,
                    tool_name,
                    timeout_secs = self.timeout.as_secs(),
                    "MCP tool call timed out"
                );
                Err(McpError::ToolTimeout {
                    tool_name: tool_name.to_string(),
                    waited: self.timeout,
                })
            }
        }
    }

    /// Deliver a tool response. Returns false when no pending call matches.
    ///
    /// A response without an id resolves the oldest outstanding call for the
    /// same tool name.
    pub fn resolve(&self, response: ToolResponse) -> bool {
        let call = {
            let mut pending = self.lock();
            let key = match response.request_id() {
                Some(id) => Some(id),
                None => oldest_matching(&pending, response.tool_name.as_deref()),
            };
            key.and_then(|key| pending.remove(&key))
        };

        let Some(call) = call else {
            debug!(
                request_id = ?response.request_id(),
                tool_name = ?response.tool_name,
                "Unmatched MCP tool response"
            );
            return false;
        };

        debug!(
            request_id = %call.request_id,
            elapsed_ms = call.issued_at.elapsed().as_millis(),
            "MCP tool response received"
        );
        let outcome = response
            .into_outcome()
            .map_err(|message| McpError::ToolError {
                tool_name: call.tool_name.clone(),
                message,
            });
        let _ = call.responder.send(outcome);
        true
    }

    /// Fail one call with a server-supplied error message.
    pub fn reject(&self, request_id: &str, message: String) -> bool {
        let Some(call) = self.lock().remove(request_id) else {
            return false;
        };
        let _ = call.responder.send(Err(McpError::ToolError {
            tool_name: call.tool_name,
            message,
        }));
        true
    }

    /// Fail every outstanding call; used when the socket goes away.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<PendingToolCall> = self.lock().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.responder.send(Err(McpError::ConnectionClosed));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

fn oldest_matching(
    pending: &HashMap<String, PendingToolCall>,
    tool_name: Option<&str>,
) -> Option<String> {
    pending
        .values()
        .filter(|call| tool_name.map_or(true, |name| call.tool_name == name))
        .min_by_key(|call| call.sequence)
        .map(|call| call.request_id.clone())
}

/// FIFO waiters for replies that carry no correlation id (`tools_list`, `status`).
#[derive(Debug)]
pub struct ReplyQueue<T> {
    next_token: AtomicU64,
    waiters: Mutex<VecDeque<(u64, oneshot::Sender<T>)>>,
}

impl<T> Default for ReplyQueue<T> {
    fn default() -> Self {
        Self {
            next_token: AtomicU64::new(0),
            waiters: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> ReplyQueue<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<(u64, oneshot::Sender<T>)>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a waiter, run `send`, and wait up to `timeout` for the next reply.
    pub async fn wait<F>(&self, request: &str, timeout: Duration, send: F) -> Result<T, McpError>
    where
        F: FnOnce() -> Result<(), McpError>,
    {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.lock().push_back((token, tx));

        let result = match send() {
            Ok(()) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(McpError::ConnectionClosed),
                Err(_) => Err(McpError::ToolTimeout {
                    tool_name: request.to_string(),
                    waited: timeout,
                }),
            },
            Err(err) => Err(err),
        };
        self.lock().retain(|(queued, _)| *queued != token);
        result
    }

    /// Hand `value` to the oldest live waiter; false if nobody was waiting.
    pub fn deliver(&self, value: T) -> bool {
        let mut waiters = self.lock();
        let mut value = value;
        while let Some((_, tx)) = waiters.pop_front() {
            match tx.send(value) {
                Ok(()) => return true,
                Err(returned) => value = returned,
            }
        }
        false
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
