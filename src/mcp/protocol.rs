//! JSON text frames exchanged with the MCP WebSocket bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    Ping,
    CallTool {
        id: String,
        tool_name: String,
        parameters: Value,
    },
    ListTools,
    GetStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        rename = "inputSchema",
        alias = "input_schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_schema: Option<Value>,
}

/// Reply to `call_tool`. The reference bridge omits `id`, so it is optional.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ToolResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl ToolResponse {
    /// Success unless the server said otherwise or supplied an error.
    pub fn into_outcome(self) -> Result<Value, String> {
        let failed = match self.success {
            Some(success) => !success,
            None => self.error.is_some(),
        };
        if failed {
            Err(self
                .error
                .as_ref()
                .map(value_to_message)
                .unwrap_or_else(|| "Tool reported failure".to_string()))
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }

    pub fn request_id(&self) -> Option<String> {
        self.id.as_ref().and_then(request_id_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub mcp_ready: bool,
    #[serde(default)]
    pub tools_count: usize,
    #[serde(default)]
    pub connections: usize,
}

/// Frames received from the bridge.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(alias = "connection")]
    Welcome {
        #[serde(default)]
        server: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        tools: Vec<ToolDescriptor>,
    },
    Pong,
    AuthSuccess {
        #[serde(default)]
        message: Option<String>,
    },
    AuthFailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(alias = "tool_result")]
    ToolResponse(ToolResponse),
    ToolsList {
        #[serde(default)]
        tools: Vec<ToolDescriptor>,
    },
    Status(ServerStatus),
    Error {
        #[serde(default)]
        error: Option<Value>,
        #[serde(default)]
        details: Option<Value>,
        #[serde(default)]
        id: Option<Value>,
    },
    #[serde(other)]
    Other,
}

impl ClientFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Normalise a JSON id into the key used for correlation.
pub fn request_id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Render an error payload as a single human-readable string.
pub fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_match_wire_format() {
        assert_eq!(
            serde_json::to_value(ClientFrame::Auth {
                api_key: "secret".to_string()
            })
            .unwrap(),
            json!({"type": "auth", "apiKey": "secret"})
        );
        assert_eq!(
            serde_json::to_value(ClientFrame::Ping).unwrap(),
            json!({"type": "ping"})
        );
        assert_eq!(
            serde_json::to_value(ClientFrame::CallTool {
                id: "c-1".to_string(),
                tool_name: "get_boards".to_string(),
                parameters: json!({"limit": 5}),
            })
            .unwrap(),
            json!({"type": "call_tool", "id": "c-1", "tool_name": "get_boards", "parameters": {"limit": 5}})
        );
        assert_eq!(
            serde_json::to_value(ClientFrame::GetStatus).unwrap(),
            json!({"type": "get_status"})
        );
    }

    #[test]
    fn parses_greeting_aliases() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "connection",
            "status": "connected",
            "server": "Monday.com MCP Server",
            "tools": [{"name": "get_boards", "description": "List boards"}]
        }))
        .unwrap();
        match frame {
            ServerFrame::Welcome { server, tools, .. } => {
                assert_eq!(server.as_deref(), Some("Monday.com MCP Server"));
                assert_eq!(tools[0].name, "get_boards");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn tool_result_without_id_parses() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_name": "get_boards",
            "result": {"boards": []},
            "success": true
        }))
        .unwrap();
        let ServerFrame::ToolResponse(response) = frame else {
            panic!("expected tool response");
        };
        assert_eq!(response.request_id(), None);
        assert_eq!(response.into_outcome(), Ok(json!({"boards": []})));
    }

    #[test]
    fn failed_tool_response_carries_message() {
        let response = ToolResponse {
            id: Some(json!(7)),
            error: Some(json!({"message": "board not found"})),
            success: Some(false),
            ..Default::default()
        };
        assert_eq!(response.request_id().as_deref(), Some("7"));
        assert_eq!(response.into_outcome(), Err("board not found".to_string()));

        let implicit = ToolResponse {
            error: Some(json!("boom")),
            ..Default::default()
        };
        assert_eq!(implicit.into_outcome(), Err("boom".to_string()));
    }

    #[test]
    fn unknown_types_become_other() {
        let frame: ServerFrame =
            serde_json::from_value(json!({"type": "heartbeat", "at": 1})).unwrap();
        assert_eq!(frame, ServerFrame::Other);

        let pong: ServerFrame =
            serde_json::from_value(json!({"type": "pong", "timestamp": "now"})).unwrap();
        assert_eq!(pong, ServerFrame::Pong);
    }

    #[test]
    fn status_and_error_frames() {
        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "status",
            "connected": true,
            "mcp_ready": true,
            "tools_count": 3,
            "connections": 1
        }))
        .unwrap();
        assert_eq!(
            frame,
            ServerFrame::Status(ServerStatus {
                connected: true,
                mcp_ready: true,
                tools_count: 3,
                connections: 1,
            })
        );

        let frame: ServerFrame = serde_json::from_value(json!({
            "type": "error",
            "error": "Unknown message type",
            "details": "oops",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(frame, ServerFrame::Error { id: None, .. }));
    }
}
