//! A chat conversation wired to the LLM client and, optionally, the relay's
//! MCP tools.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::config::LlmSettings;
use crate::core::llm_client::LlmClient;
use crate::core::llm_error::LlmError;
use crate::core::message::{Conversation, ConversationMessage, Role};
use crate::core::relay::RelayHandle;
use crate::mcp::McpError;
use crate::utils::logging::LoggingState;

const TOOL_DIRECTIVE: &str = "/tool";
const EMPTY_REPLY_NOTICE: &str = "The model returned an empty reply.";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    EmptyMessage,
    InvalidToolDirective(String),
    Tool(McpError),
    Llm(LlmError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyMessage => write!(f, "Message is empty"),
            SessionError::InvalidToolDirective(reason) => {
                write!(f, "Invalid /tool directive: {reason}")
            }
            SessionError::Tool(err) => write!(f, "{err}"),
            SessionError::Llm(err) => write!(f, "{}", err.summary()),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LlmError> for SessionError {
    fn from(err: LlmError) -> Self {
        SessionError::Llm(err)
    }
}

impl From<McpError> for SessionError {
    fn from(err: McpError) -> Self {
        SessionError::Tool(err)
    }
}

/// `/tool <name> [json]` on the first line; anything after it is the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDirective {
    pub tool_name: String,
    pub parameters: Value,
    pub prompt: Option<String>,
}

/// Parse a leading tool directive. Returns `Ok(None)` for ordinary text.
pub fn parse_tool_directive(text: &str) -> Result<Option<ToolDirective>, SessionError> {
    let text = text.trim_start();
    let Some(rest) = text.strip_prefix(TOOL_DIRECTIVE) else {
        return Ok(None);
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }

    let (first_line, prompt) = match rest.split_once('\n') {
        Some((line, prompt)) => (line, Some(prompt.trim())),
        None => (rest, None),
    };
    let first_line = first_line.trim();
    let (tool_name, raw_parameters) = match first_line.split_once(char::is_whitespace) {
        Some((name, params)) => (name, params.trim()),
        None => (first_line, ""),
    };
    if tool_name.is_empty() {
        return Err(SessionError::InvalidToolDirective(
            "missing tool name".to_string(),
        ));
    }

    let parameters = if raw_parameters.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw_parameters)
            .map_err(|err| SessionError::InvalidToolDirective(err.to_string()))?
    };

    Ok(Some(ToolDirective {
        tool_name: tool_name.to_string(),
        parameters,
        prompt: prompt.filter(|prompt| !prompt.is_empty()).map(str::to_string),
    }))
}

/// The system message recorded after a successful tool call.
pub fn tool_result_message(tool_name: &str, result: &Value) -> String {
    format!("Tool {tool_name} executed: {}", render_value(result))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Conversation state plus the clients that feed it.
pub struct ChatSession {
    client: LlmClient,
    settings: LlmSettings,
    conversation: Conversation,
    tools: Option<RelayHandle>,
    logging: LoggingState,
}

impl ChatSession {
    pub fn new(client: LlmClient, settings: LlmSettings) -> Self {
        Self {
            client,
            settings,
            conversation: Conversation::new(),
            tools: None,
            logging: LoggingState::disabled(),
        }
    }

    pub fn with_tools(mut self, relay: RelayHandle) -> Self {
        self.tools = Some(relay);
        self
    }

    pub fn with_logging(mut self, logging: LoggingState) -> Self {
        self.logging = logging;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub fn logging_mut(&mut self) -> &mut LoggingState {
        &mut self.logging
    }

    /// Send one user message.
    ///
    /// A leading `/tool` directive runs that tool first and records its result
    /// as a system message; a prompt following the directive is then sent to
    /// the model with the result attached. Failures are recorded in the
    /// conversation as system messages and also returned.
    pub async fn send<F>(&mut self, text: &str, mut on_delta: F) -> Result<Option<String>, SessionError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.record(Role::User, text);

        let directive = match parse_tool_directive(text) {
            Ok(directive) => directive,
            Err(err) => return Err(self.fail(err)),
        };

        let prompt = match directive {
            None => text.to_string(),
            Some(directive) => {
                let result = match self.run_tool(&directive).await {
                    Ok(result) => result,
                    Err(err) => return Err(self.fail(err)),
                };
                self.record(Role::System, tool_result_message(&directive.tool_name, &result));
                match directive.prompt {
                    Some(prompt) => format!(
                        "{prompt}\n\nResult of tool {}:\n{}",
                        directive.tool_name,
                        render_value(&result)
                    ),
                    None => return Ok(None),
                }
            }
        };

        let conversation = &mut self.conversation;
        let outcome = self
            .client
            .complete(&prompt, &self.settings, |delta| {
                conversation.append_streaming(delta);
                on_delta(delta);
            })
            .await;

        let streamed = self.conversation.finish_streaming().cloned();
        match outcome {
            Ok(reply) => {
                match streamed {
                    Some(message) => self.log(&message),
                    None if reply.is_empty() => {
                        debug!("LLM reply was empty");
                        self.record(Role::System, EMPTY_REPLY_NOTICE);
                    }
                    None => self.record(Role::Assistant, reply.clone()),
                }
                Ok(Some(reply))
            }
            Err(err) => {
                if let Some(message) = streamed {
                    self.log(&message);
                }
                Err(self.fail(err.into()))
            }
        }
    }

    async fn run_tool(&self, directive: &ToolDirective) -> Result<Value, SessionError> {
        let relay = self.tools.as_ref().ok_or(McpError::NotConnected)?;
        debug!(tool_name = %directive.tool_name, "Running tool from chat");
        Ok(relay
            .call_tool(&directive.tool_name, directive.parameters.clone())
            .await?)
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.record(Role::System, format!("Error: {err}"));
        err
    }

    fn record(&mut self, role: Role, text: impl Into<String>) {
        self.conversation.push(role, text);
        if let Some(message) = self.conversation.last().cloned() {
            self.log(&message);
        }
    }

    fn log(&self, message: &ConversationMessage) {
        if let Err(err) = self.logging.log_message(message) {
            warn!(error = %err, "Failed to write transcript");
        }
    }
}
