//! One WebSocket session with the MCP bridge.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::core::config::McpSettings;
use crate::mcp::correlator::{ReplyQueue, ToolCallCorrelator};
use crate::mcp::error::McpError;
use crate::mcp::events::{ConnectionSignal, McpEvent};
use crate::mcp::protocol::{
    request_id_key, value_to_message, ClientFrame, ServerFrame, ServerStatus, ToolDescriptor,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_GRACE: Duration = Duration::from_secs(2);

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Opaque connection token derived from the creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        let counter = NEXT_CONNECTION.fetch_add(1, Ordering::SeqCst);
        Self(format!(
            "conn_{}_{counter}",
            Utc::now().timestamp_millis()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Timing knobs for connect, calls, keep-alive and reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub connect_timeout: Duration,
    pub tool_call_timeout: Duration,
    pub ping_interval: Duration,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl ConnectionOptions {
    pub fn from_settings(settings: &McpSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            tool_call_timeout: settings.tool_call_timeout(),
            ping_interval: settings.ping_interval(),
            auto_reconnect: settings.auto_reconnect,
            reconnect_delay: settings.reconnect_delay(),
            reconnect_max_delay: settings.reconnect_max_delay(),
        }
    }

    /// Delay before reconnect attempt number `attempt` (zero-based).
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay.max(self.reconnect_delay))
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_settings(&McpSettings::default())
    }
}

/// Snapshot of one connection for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionStatus {
    pub id: ConnectionId,
    pub url: String,
    pub open: bool,
    pub authenticated: bool,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(String),
}

#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    url: String,
    open: AtomicBool,
    authenticated: AtomicBool,
    close_requested: AtomicBool,
    last_activity_ms: AtomicI64,
    outbound: mpsc::UnboundedSender<Outbound>,
    correlator: ToolCallCorrelator,
    tool_lists: ReplyQueue<Vec<ToolDescriptor>>,
    statuses: ReplyQueue<ServerStatus>,
    closed: watch::Sender<bool>,
    reply_timeout: Duration,
}

impl Shared {
    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }
}

/// Cheap handle to a live (or recently closed) bridge connection.
#[derive(Debug, Clone)]
pub struct McpConnection {
    shared: Arc<Shared>,
}

/// Open a WebSocket to `url`, failing if no open/error event occurs within
/// `options.connect_timeout`.
///
/// A non-empty `auth_token` is sent once as an `auth` frame; its outcome is
/// reported later through `signals`, not through this result.
pub async fn connect(
    url: &str,
    auth_token: &str,
    options: &ConnectionOptions,
    signals: mpsc::UnboundedSender<ConnectionSignal>,
) -> Result<McpConnection, McpError> {
    let ws = open_socket(url, options.connect_timeout).await?;

    let id = ConnectionId::new();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (closed_tx, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        correlator: ToolCallCorrelator::new(id.as_str(), options.tool_call_timeout),
        id,
        url: url.to_string(),
        open: AtomicBool::new(true),
        authenticated: AtomicBool::new(false),
        close_requested: AtomicBool::new(false),
        last_activity_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        outbound: outbound_tx,
        tool_lists: ReplyQueue::default(),
        statuses: ReplyQueue::default(),
        closed: closed_tx,
        reply_timeout: options.tool_call_timeout,
    });

    info!(connection_id = %shared.id, url, "MCP connection opened");
    let _ = signals.send(ConnectionSignal::Event(McpEvent::Connected {
        connection_id: shared.id.clone(),
        url: url.to_string(),
    }));

    tokio::spawn(run_io(ws, Arc::clone(&shared), outbound_rx, signals));

    let connection = McpConnection { shared };
    let token = auth_token.trim();
    if !token.is_empty() {
        connection.send_frame(&ClientFrame::Auth {
            api_key: token.to_string(),
        })?;
    }
    Ok(connection)
}

async fn open_socket(url: &str, wait: Duration) -> Result<WsStream, McpError> {
    let started = Instant::now();
    match tokio::time::timeout(wait, connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(err)) => {
            debug!(url, error = %err, "MCP connect failed");
            Err(McpError::ConnectRefused {
                url: url.to_string(),
                reason: err.to_string(),
            })
        }
        Err(_) => {
            debug!(url, timeout_secs = wait.as_secs(), "MCP connect timed out");
            Err(McpError::ConnectTimeout {
                url: url.to_string(),
                waited: started.elapsed(),
            })
        }
    }
}

/// Open and immediately close a socket to prove the endpoint is reachable.
pub async fn test_mcp_connection(url: &str, wait: Duration) -> Result<(), McpError> {
    let mut ws = open_socket(url, wait).await?;
    let _ = ws
        .close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "Connection test".into(),
        }))
        .await;
    Ok(())
}

async fn run_io(
    ws: WsStream,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    signals: mpsc::UnboundedSender<ConnectionSignal>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut closing = false;
    let close_deadline = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(close_deadline);

    loop {
        tokio::select! {
            next = outbound.recv(), if !closing => {
                let message = match next {
                    Some(Outbound::Text(text)) => Message::Text(text),
                    Some(Outbound::Close(reason)) => {
                        closing = true;
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.into(),
                        }))
                    }
                    None => {
                        closing = true;
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        }))
                    }
                };
                if let Err(err) = sink.send(message).await {
                    debug!(connection_id = %shared.id, error = %err, "MCP send failed");
                    break;
                }
                if closing {
                    close_deadline
                        .as_mut()
                        .reset(Instant::now() + CLOSE_HANDSHAKE_GRACE);
                }
            }
            _ = &mut close_deadline, if closing => {
                debug!(connection_id = %shared.id, "MCP peer did not answer close; dropping socket");
                break;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        shared.touch();
                        handle_text(&shared, &signals, &text);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(connection_id = %shared.id, frame = ?frame, "MCP close frame received");
                        break;
                    }
                    Some(Ok(_)) => shared.touch(),
                    Some(Err(err)) => {
                        debug!(connection_id = %shared.id, error = %err, "MCP read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    shared.open.store(false, Ordering::SeqCst);
    let failed = shared.correlator.fail_all();
    shared.tool_lists.clear();
    shared.statuses.clear();
    let requested = shared.close_requested.load(Ordering::SeqCst);
    if requested {
        debug!(connection_id = %shared.id, failed_calls = failed, "MCP connection closed");
    } else {
        warn!(connection_id = %shared.id, failed_calls = failed, "MCP connection closed unexpectedly");
    }
    let _ = shared.closed.send(true);
    let _ = signals.send(ConnectionSignal::Closed {
        connection_id: shared.id.clone(),
        requested,
    });
}

fn handle_text(shared: &Shared, signals: &mpsc::UnboundedSender<ConnectionSignal>, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            debug!(connection_id = %shared.id, error = %err, "Skipping malformed MCP frame");
            return;
        }
    };
    let connection_id = shared.id.clone();
    let emit = |event: McpEvent| {
        let _ = signals.send(ConnectionSignal::Event(event));
    };
    let passthrough = |frame: Value| McpEvent::Message {
        connection_id: shared.id.clone(),
        frame,
    };

    match serde_json::from_value::<ServerFrame>(value.clone()) {
        Ok(ServerFrame::Welcome { server, tools, .. }) => emit(McpEvent::Welcome {
            connection_id,
            server,
            tools,
        }),
        Ok(ServerFrame::Pong) => debug!(connection_id = %shared.id, "MCP pong"),
        Ok(ServerFrame::AuthSuccess { .. }) => {
            shared.authenticated.store(true, Ordering::SeqCst);
            emit(McpEvent::AuthSucceeded { connection_id });
        }
        Ok(ServerFrame::AuthFailed { message, error }) => {
            shared.authenticated.store(false, Ordering::SeqCst);
            emit(McpEvent::AuthFailed {
                connection_id,
                message: message.or(error),
            });
        }
        Ok(ServerFrame::ToolResponse(response)) => {
            if !shared.correlator.resolve(response) {
                emit(passthrough(value));
            }
        }
        Ok(ServerFrame::ToolsList { tools }) => {
            if !shared.tool_lists.deliver(tools) {
                emit(passthrough(value));
            }
        }
        Ok(ServerFrame::Status(status)) => {
            if !shared.statuses.deliver(status) {
                emit(passthrough(value));
            }
        }
        Ok(ServerFrame::Error { error, details, id }) => {
            let message = error
                .as_ref()
                .map(value_to_message)
                .unwrap_or_else(|| "Unknown server error".to_string());
            let rejected = id
                .as_ref()
                .and_then(request_id_key)
                .is_some_and(|key| shared.correlator.reject(&key, message.clone()));
            if !rejected {
                emit(McpEvent::ServerError {
                    connection_id,
                    error: message,
                    details,
                });
            }
        }
        Ok(ServerFrame::Other) | Err(_) => emit(passthrough(value)),
    }
}

impl McpConnection {
    pub fn id(&self) -> &ConnectionId {
        &self.shared.id
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    pub fn pending_calls(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    pub fn status(&self) -> ConnectionStatus {
        let millis = self.shared.last_activity_ms.load(Ordering::SeqCst);
        ConnectionStatus {
            id: self.shared.id.clone(),
            url: self.shared.url.clone(),
            open: self.is_open(),
            authenticated: self.is_authenticated(),
            last_activity: Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    fn send_text(&self, text: String) -> Result<(), McpError> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        self.shared
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| McpError::NotConnected)
    }

    pub fn send_frame(&self, frame: &ClientFrame) -> Result<(), McpError> {
        let text = frame
            .to_text()
            .map_err(|err| McpError::Send(err.to_string()))?;
        self.send_text(text)
    }

    /// Send an arbitrary JSON frame as-is.
    pub fn send_raw(&self, frame: &Value) -> Result<(), McpError> {
        self.send_text(frame.to_string())
    }

    pub fn ping(&self) -> Result<(), McpError> {
        self.send_frame(&ClientFrame::Ping)
    }

    /// Mark the connection unusable without waiting for the socket to finish.
    pub fn mark_closed(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
    }

    pub async fn call_tool(&self, tool_name: &str, parameters: Value) -> Result<Value, McpError> {
        if !self.is_open() {
            return Err(McpError::NotConnected);
        }
        self.shared
            .correlator
            .call(tool_name, parameters, |frame| self.send_frame(&frame))
            .await
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.shared
            .tool_lists
            .wait("list_tools", self.shared.reply_timeout, || {
                self.send_frame(&ClientFrame::ListTools)
            })
            .await
    }

    pub async fn get_status(&self) -> Result<ServerStatus, McpError> {
        self.shared
            .statuses
            .wait("get_status", self.shared.reply_timeout, || {
                self.send_frame(&ClientFrame::GetStatus)
            })
            .await
    }

    /// Close with a normal-closure code and `reason`.
    pub fn close(&self, reason: &str) {
        self.shared.close_requested.store(true, Ordering::SeqCst);
        self.shared.open.store(false, Ordering::SeqCst);
        let _ = self.shared.outbound.send(Outbound::Close(reason.to_string()));
    }

    /// Resolve once the io task has finished.
    pub async fn closed(&self) {
        let mut rx = self.shared.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
