//! The background relay: typed requests from the front end, one owned
//! connection manager, and the periodic health sweep.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::config::McpSettings;
use crate::core::prompts::{contextual_prompt, PageAction, PageContext};
use crate::mcp::manager::McpManager;
use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::{ConnectionId, ConnectionOptions, McpConnection, McpError, McpEvent, McpStatus};

const COMMAND_BUFFER: usize = 32;
const ENDPOINT_CHANGED_REASON: &str = "Endpoint changed";

/// Requests the front end can send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayRequest {
    /// Connect to `url` (or the configured endpoint) with `api_key` (or the
    /// configured token).
    ConnectMcp {
        #[serde(default)]
        url: Option<String>,
        #[serde(default, alias = "apiKey")]
        api_key: Option<String>,
    },
    /// Forward a raw frame over an existing connection.
    SendMcpMessage {
        #[serde(default, alias = "connectionId")]
        connection_id: Option<String>,
        message: Value,
    },
    GetMcpStatus,
    CallMcpTool {
        #[serde(alias = "toolName")]
        tool_name: String,
        #[serde(default)]
        parameters: Value,
    },
    ListMcpTools,
    OpenChatWithText {
        action: PageAction,
        text: String,
        #[serde(default)]
        context: PageContext,
    },
    Ping,
}

/// Replies to [`RelayRequest`]s, shaped the way the front end reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayResponse {
    Connected {
        success: bool,
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
    Sent {
        success: bool,
    },
    Status(McpStatus),
    ToolResult {
        success: bool,
        result: Value,
    },
    Tools {
        success: bool,
        tools: Vec<ToolDescriptor>,
    },
    Prompt {
        success: bool,
        prompt: String,
    },
    Pong {
        status: &'static str,
        timestamp: i64,
    },
    Failed {
        success: bool,
        error: String,
    },
}

impl RelayResponse {
    pub fn failed(error: impl ToString) -> Self {
        RelayResponse::Failed {
            success: false,
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            RelayResponse::Connected { success, .. }
            | RelayResponse::Sent { success }
            | RelayResponse::ToolResult { success, .. }
            | RelayResponse::Tools { success, .. }
            | RelayResponse::Prompt { success, .. }
            | RelayResponse::Failed { success, .. } => *success,
            RelayResponse::Status(_) | RelayResponse::Pong { .. } => true,
        }
    }
}

enum Command {
    Request(RelayRequest, oneshot::Sender<RelayResponse>),
    Primary(oneshot::Sender<Option<McpConnection>>),
    Status(oneshot::Sender<McpStatus>),
    ApplySettings(McpSettings, oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front-end handle to a running [`Relay`].
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
}

impl RelayHandle {
    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, McpError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| McpError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| McpError::ConnectionClosed)
    }

    pub async fn request(&self, request: RelayRequest) -> Result<RelayResponse, McpError> {
        self.ask(|reply| Command::Request(request, reply)).await
    }

    /// The connection tool calls go to, if any is open.
    pub async fn primary(&self) -> Result<Option<McpConnection>, McpError> {
        self.ask(Command::Primary).await
    }

    /// Call a tool on the primary connection. The relay loop is not held
    /// while the call is outstanding.
    pub async fn call_tool(&self, tool_name: &str, parameters: Value) -> Result<Value, McpError> {
        let connection = self.primary().await?.ok_or(McpError::NotConnected)?;
        connection.call_tool(tool_name, parameters).await
    }

    pub async fn status(&self) -> Result<McpStatus, McpError> {
        self.ask(Command::Status).await
    }

    /// Push new MCP settings. Returns true when the endpoint or token changed.
    pub async fn apply_settings(&self, settings: McpSettings) -> Result<bool, McpError> {
        self.ask(|reply| Command::ApplySettings(settings, reply)).await
    }

    /// Close every connection and stop the relay loop.
    pub async fn shutdown(&self) {
        let _ = self.ask(Command::Shutdown).await;
    }
}

/// Owns the [`McpManager`] and serves front-end requests one at a time.
pub struct Relay {
    manager: McpManager,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<McpEvent>,
}

impl Relay {
    pub fn new(settings: &McpSettings) -> (Self, RelayHandle, mpsc::UnboundedReceiver<McpEvent>) {
        Self::with_options(settings, ConnectionOptions::from_settings(settings))
    }

    pub fn with_options(
        settings: &McpSettings,
        options: ConnectionOptions,
    ) -> (Self, RelayHandle, mpsc::UnboundedReceiver<McpEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let relay = Self {
            manager: McpManager::with_options(settings, options),
            commands: commands_rx,
            events: events_tx,
        };
        (
            relay,
            RelayHandle {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// Start the relay loop on the runtime.
    pub fn spawn(
        settings: &McpSettings,
    ) -> (RelayHandle, mpsc::UnboundedReceiver<McpEvent>, JoinHandle<()>) {
        let (relay, handle, events) = Self::new(settings);
        let task = tokio::spawn(relay.run());
        (handle, events, task)
    }

    /// Serve commands, forward side-channel events and run the health sweep
    /// until shut down or every handle is dropped.
    pub async fn run(mut self) {
        let mut period = self.manager.options().ping_interval;
        let mut health = health_interval(period);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("Relay handles dropped; shutting down");
                        self.manager.shutdown().await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                    let wanted = self.manager.options().ping_interval;
                    if wanted != period {
                        period = wanted;
                        health = health_interval(period);
                    }
                }
                Some(event) = self.manager.next_event() => self.forward(event),
                _ = health.tick() => {
                    let report = self.manager.health_check();
                    debug!(pinged = report.pinged, purged = report.purged.len(), "MCP health check");
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Request(request, reply) => {
                self.handle_request(request, reply).await;
            }
            Command::Primary(reply) => {
                let _ = reply.send(self.manager.primary().cloned());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.manager.status());
            }
            Command::ApplySettings(settings, reply) => {
                let changed = self.apply_settings(&settings).await;
                let _ = reply.send(changed);
            }
            Command::Shutdown(reply) => {
                self.manager.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_request(&mut self, request: RelayRequest, reply: oneshot::Sender<RelayResponse>) {
        let response = match request {
            RelayRequest::ConnectMcp { url, api_key } => {
                let url = url.unwrap_or_else(|| self.manager.settings().endpoint.clone());
                let token = api_key.unwrap_or_else(|| self.manager.settings().auth_token.clone());
                match self.manager.connect_with(&url, &token).await {
                    Ok(connection) => RelayResponse::Connected {
                        success: true,
                        connection_id: connection.id().clone(),
                    },
                    Err(err) => {
                        warn!(url = %url, error = %err, "MCP connect failed");
                        RelayResponse::failed(err)
                    }
                }
            }
            RelayRequest::SendMcpMessage {
                connection_id,
                message,
            } => {
                let id = connection_id.as_deref().map(ConnectionId::from);
                match self.manager.send_raw(id.as_ref(), &message) {
                    Ok(()) => RelayResponse::Sent { success: true },
                    Err(err) => RelayResponse::failed(err),
                }
            }
            RelayRequest::GetMcpStatus => RelayResponse::Status(self.manager.status()),
            RelayRequest::CallMcpTool {
                tool_name,
                parameters,
            } => {
                let Some(connection) = self.manager.primary().cloned() else {
                    let _ = reply.send(RelayResponse::failed(McpError::NotConnected));
                    return;
                };
                tokio::spawn(async move {
                    let response = match connection.call_tool(&tool_name, parameters).await {
                        Ok(result) => RelayResponse::ToolResult {
                            success: true,
                            result,
                        },
                        Err(err) => RelayResponse::failed(err),
                    };
                    let _ = reply.send(response);
                });
                return;
            }
            RelayRequest::ListMcpTools => {
                let Some(connection) = self.manager.primary().cloned() else {
                    let _ = reply.send(RelayResponse::failed(McpError::NotConnected));
                    return;
                };
                tokio::spawn(async move {
                    let response = match connection.list_tools().await {
                        Ok(tools) => RelayResponse::Tools {
                            success: true,
                            tools,
                        },
                        Err(err) => RelayResponse::failed(err),
                    };
                    let _ = reply.send(response);
                });
                return;
            }
            RelayRequest::OpenChatWithText {
                action,
                text,
                context,
            } => RelayResponse::Prompt {
                success: true,
                prompt: contextual_prompt(action, &text, &context),
            },
            RelayRequest::Ping => RelayResponse::Pong {
                status: "ok",
                timestamp: Utc::now().timestamp_millis(),
            },
        };
        let _ = reply.send(response);
    }

    async fn apply_settings(&mut self, settings: &McpSettings) -> bool {
        let changed = self.manager.update_settings(settings);
        if !changed {
            return false;
        }
        self.manager.close_all(ENDPOINT_CHANGED_REASON).await;
        if settings.endpoint.trim().is_empty() {
            return true;
        }
        info!(url = %settings.endpoint, "MCP endpoint changed; reconnecting");
        if let Err(err) = self.manager.connect().await {
            warn!(url = %settings.endpoint, error = %err, "MCP reconnect after settings change failed");
        }
        true
    }

    fn forward(&self, event: McpEvent) {
        match &event {
            McpEvent::AuthSucceeded { connection_id } => {
                info!(connection_id = %connection_id, "MCP authenticated");
            }
            McpEvent::AuthFailed {
                connection_id,
                message,
            } => {
                warn!(connection_id = %connection_id, message = ?message, "MCP authentication failed");
            }
            McpEvent::ServerError {
                connection_id,
                error,
                ..
            } => {
                warn!(connection_id = %connection_id, error = %error, "MCP server error");
            }
            McpEvent::ReconnectFailed { error, attempt } => {
                debug!(error = %error, attempt, "MCP reconnect attempt failed");
            }
            _ => {}
        }
        let _ = self.events.send(event);
    }
}

fn health_interval(period: Duration) -> tokio::time::Interval {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::connection::test_support::{bridge_handler, spawn_ws_server};
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message;

    fn settings(url: &str) -> McpSettings {
        McpSettings {
            endpoint: url.to_string(),
            ..McpSettings::default()
        }
    }

    #[test]
    fn requests_parse_from_front_end_json() {
        let request: RelayRequest = serde_json::from_value(json!({
            "type": "connect_mcp",
            "url": "ws://localhost:8080/mcp",
            "apiKey": "secret"
        }))
        .unwrap();
        assert_eq!(
            request,
            RelayRequest::ConnectMcp {
                url: Some("ws://localhost:8080/mcp".to_string()),
                api_key: Some("secret".to_string()),
            }
        );

        let request: RelayRequest = serde_json::from_value(json!({
            "type": "send_mcp_message",
            "connectionId": "conn_1_1",
            "message": {"type": "list_tools"}
        }))
        .unwrap();
        assert!(matches!(
            request,
            RelayRequest::SendMcpMessage { connection_id: Some(ref id), .. } if id == "conn_1_1"
        ));

        let request: RelayRequest = serde_json::from_value(json!({
            "type": "open_chat_with_text",
            "action": "explicar",
            "text": "hello"
        }))
        .unwrap();
        assert_eq!(
            request,
            RelayRequest::OpenChatWithText {
                action: PageAction::Explain,
                text: "hello".to_string(),
                context: PageContext::default(),
            }
        );
    }

    #[test]
    fn responses_serialize_flat() {
        let response = RelayResponse::Connected {
            success: true,
            connection_id: ConnectionId::from("conn_1_1"),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"success": true, "connectionId": "conn_1_1"})
        );
        assert_eq!(
            serde_json::to_value(RelayResponse::failed(McpError::NotConnected)).unwrap(),
            json!({"success": false, "error": "MCP server not connected"})
        );
        assert!(!RelayResponse::failed("x").is_success());
    }

    #[tokio::test]
    async fn connect_call_and_status_through_the_relay() {
        let (url, _seen) = spawn_ws_server(bridge_handler).await;
        let (handle, mut events, task) = Relay::spawn(&settings(&url));

        let response = handle
            .request(RelayRequest::ConnectMcp {
                url: None,
                api_key: Some("token".to_string()),
            })
            .await
            .expect("relay alive");
        let RelayResponse::Connected { connection_id, .. } = response else {
            panic!("expected connected, got {response:?}");
        };

        loop {
            let event = events.recv().await.expect("event");
            if matches!(event, McpEvent::AuthSucceeded { .. }) {
                break;
            }
        }

        let result = handle
            .call_tool("echo", json!({"text": "hi"}))
            .await
            .expect("tool result");
        assert_eq!(result, json!({"text": "hi"}));

        let status = handle.status().await.expect("status");
        assert_eq!(status.total, 1);
        assert_eq!(status.active, 1);
        assert_eq!(status.connections[0].id, connection_id);
        assert!(status.connections[0].authenticated);

        let response = handle
            .request(RelayRequest::CallMcpTool {
                tool_name: "missing".to_string(),
                parameters: json!({}),
            })
            .await
            .expect("relay alive");
        assert!(!response.is_success());

        handle.shutdown().await;
        task.await.expect("relay task");
        assert!(handle.status().await.is_err());
    }

    #[tokio::test]
    async fn tool_call_without_connection_is_rejected() {
        let (handle, _events, _task) = Relay::spawn(&settings(""));
        assert_eq!(
            handle.call_tool("echo", json!({})).await,
            Err(McpError::NotConnected)
        );
        let response = handle
            .request(RelayRequest::ListMcpTools)
            .await
            .expect("relay alive");
        assert_eq!(response, RelayResponse::failed(McpError::NotConnected));
    }

    #[tokio::test]
    async fn ping_and_prompt_are_answered_locally() {
        let (handle, _events, _task) = Relay::spawn(&settings(""));
        let response = handle.request(RelayRequest::Ping).await.expect("pong");
        assert!(matches!(response, RelayResponse::Pong { status: "ok", .. }));

        let response = handle
            .request(RelayRequest::OpenChatWithText {
                action: PageAction::Analyze,
                text: "x = 1".to_string(),
                context: PageContext {
                    title: "Docs".to_string(),
                    url: "https://example.com".to_string(),
                },
            })
            .await
            .expect("prompt");
        assert_eq!(
            response,
            RelayResponse::Prompt {
                success: true,
                prompt: contextual_prompt(
                    PageAction::Analyze,
                    "x = 1",
                    &PageContext {
                        title: "Docs".to_string(),
                        url: "https://example.com".to_string(),
                    }
                ),
            }
        );
    }

    #[tokio::test]
    async fn endpoint_change_reconnects_to_new_server() {
        let (first_url, mut first_seen) = spawn_ws_server(bridge_handler).await;
        let (second_url, _second_seen) = spawn_ws_server(bridge_handler).await;
        let (handle, _events, _task) = Relay::spawn(&settings(&first_url));

        handle
            .request(RelayRequest::ConnectMcp {
                url: None,
                api_key: None,
            })
            .await
            .expect("connect");

        assert!(!handle
            .apply_settings(settings(&first_url))
            .await
            .expect("same endpoint"));
        assert!(handle
            .apply_settings(settings(&second_url))
            .await
            .expect("new endpoint"));

        let status = handle.status().await.expect("status");
        assert_eq!(status.total, 1);
        assert_eq!(status.connections[0].url, second_url);

        loop {
            if let Some(Message::Close(Some(frame))) = first_seen.recv().await {
                assert_eq!(frame.reason, ENDPOINT_CHANGED_REASON);
                break;
            }
        }
    }

    #[tokio::test]
    async fn raw_messages_reach_the_named_connection() {
        let (url, mut seen) = spawn_ws_server(bridge_handler).await;
        let (handle, _events, _task) = Relay::spawn(&settings(&url));
        let RelayResponse::Connected { connection_id, .. } = handle
            .request(RelayRequest::ConnectMcp {
                url: Some(url.clone()),
                api_key: None,
            })
            .await
            .expect("connect")
        else {
            panic!("expected connected");
        };

        let response = handle
            .request(RelayRequest::SendMcpMessage {
                connection_id: Some(connection_id.to_string()),
                message: json!({"type": "get_status"}),
            })
            .await
            .expect("send");
        assert_eq!(response, RelayResponse::Sent { success: true });

        loop {
            let Some(Message::Text(text)) = seen.recv().await else {
                continue;
            };
            if serde_json::from_str::<Value>(&text).ok() == Some(json!({"type": "get_status"})) {
                break;
            }
        }

        let response = handle
            .request(RelayRequest::SendMcpMessage {
                connection_id: Some("conn_missing".to_string()),
                message: json!({"type": "ping"}),
            })
            .await
            .expect("send");
        assert!(!response.is_success());
    }
}
