use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Failures of the MCP bridge connection and tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum McpError {
    /// No open or error event within the connect timeout.
    ConnectTimeout { url: String, waited: Duration },
    ConnectRefused { url: String, reason: String },
    NotConnected,
    ToolTimeout { tool_name: String, waited: Duration },
    /// The server answered with `success: false` or an error frame.
    ToolError { tool_name: String, message: String },
    /// The socket closed while the call was outstanding.
    ConnectionClosed,
    Send(String),
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpError::ConnectTimeout { url, waited } => write!(
                f,
                "Timed out after {:.1}s connecting to MCP server at {url}",
                waited.as_secs_f64()
            ),
            McpError::ConnectRefused { url, reason } => {
                write!(f, "Could not connect to MCP server at {url}: {reason}")
            }
            McpError::NotConnected => write!(f, "MCP server not connected"),
            McpError::ToolTimeout { tool_name, waited } => write!(
                f,
                "Tool '{tool_name}' timed out after {}s",
                waited.as_secs()
            ),
            McpError::ToolError { tool_name, message } => {
                write!(f, "Tool '{tool_name}' failed: {message}")
            }
            McpError::ConnectionClosed => write!(f, "MCP connection closed"),
            McpError::Send(message) => write!(f, "Failed to send MCP frame: {message}"),
        }
    }
}

impl StdError for McpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_messages_include_durations() {
        let err = McpError::ToolTimeout {
            tool_name: "get_boards".to_string(),
            waited: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Tool 'get_boards' timed out after 30s");

        let err = McpError::ConnectTimeout {
            url: "ws://localhost:8080/mcp".to_string(),
            waited: Duration::from_millis(10_000),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 10.0s connecting to MCP server at ws://localhost:8080/mcp"
        );
    }
}
