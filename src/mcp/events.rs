use std::time::Duration;

use serde_json::Value;

use crate::mcp::connection::{ConnectionId, McpConnection};
use crate::mcp::error::McpError;
use crate::mcp::protocol::ToolDescriptor;

/// Asynchronous notifications from the MCP side channel.
///
/// Auth results, greetings and server errors arrive here rather than as part
/// of `connect`'s result.
#[derive(Debug, Clone, PartialEq)]
pub enum McpEvent {
    Connected {
        connection_id: ConnectionId,
        url: String,
    },
    Welcome {
        connection_id: ConnectionId,
        server: Option<String>,
        tools: Vec<ToolDescriptor>,
    },
    AuthSucceeded {
        connection_id: ConnectionId,
    },
    AuthFailed {
        connection_id: ConnectionId,
        message: Option<String>,
    },
    ServerError {
        connection_id: ConnectionId,
        error: String,
        details: Option<Value>,
    },
    /// Any frame no waiter claimed, passed through untouched.
    Message {
        connection_id: ConnectionId,
        frame: Value,
    },
    Disconnected {
        connection_id: ConnectionId,
        will_reconnect: bool,
    },
    ReconnectScheduled {
        delay: Duration,
        attempt: u32,
    },
    ReconnectFailed {
        error: String,
        attempt: u32,
    },
}

/// What connection tasks report back to the manager.
#[derive(Debug)]
pub enum ConnectionSignal {
    Event(McpEvent),
    Closed {
        connection_id: ConnectionId,
        requested: bool,
    },
    Reconnected {
        generation: u64,
        result: Result<McpConnection, McpError>,
    },
}
