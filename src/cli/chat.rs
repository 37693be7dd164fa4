//! Line-oriented interactive chat

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cli::mcp::{connect, describe_event};
use crate::core::config::Settings;
use crate::core::llm_client::LlmClient;
use crate::core::message::Role;
use crate::core::relay::{Relay, RelayHandle};
use crate::core::session::ChatSession;
use crate::mcp::McpEvent;
use crate::utils::logging::LoggingState;

/// What one line of input asks for.
#[derive(Debug, PartialEq)]
pub enum ChatInput {
    Quit,
    ToggleLog,
    Status,
    /// The line ended with `\`; more input follows.
    Continue(String),
    Message(String),
    Empty,
}

/// Classify `line`, given any text carried over from `\` continuations.
pub fn classify_line(pending: &str, line: &str) -> ChatInput {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(head) = line.strip_suffix('\\') {
        return ChatInput::Continue(format!("{pending}{head}\n"));
    }
    if pending.is_empty() {
        match line.trim() {
            "" => return ChatInput::Empty,
            "/quit" | "/exit" => return ChatInput::Quit,
            "/log" => return ChatInput::ToggleLog,
            "/status" => return ChatInput::Status,
            _ => {}
        }
    }
    ChatInput::Message(format!("{pending}{line}"))
}

pub async fn run_chat(settings: Settings, log: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let logging = LoggingState::new(log)?;
    let notifications = settings.ui.notifications;
    let streaming = settings.llm.streaming;
    let mut session = ChatSession::new(LlmClient::new(), settings.llm.clone()).with_logging(logging);

    let mut relay: Option<RelayHandle> = None;
    let mut events: Option<mpsc::UnboundedReceiver<McpEvent>> = None;
    if !settings.mcp.endpoint.trim().is_empty() {
        let (handle, receiver, _task) = Relay::spawn(&settings.mcp);
        if let Err(err) = connect(&handle).await {
            eprintln!("⚠️  MCP bridge unavailable: {err}");
        }
        session = session.with_tools(handle.clone());
        relay = Some(handle);
        events = Some(receiver);
    }

    eprintln!("🚀 mcp-chat: {} / {}", settings.llm.provider, settings.llm.model);
    match &relay {
        Some(_) => eprintln!("🧰 MCP bridge: {}", settings.mcp.endpoint),
        None => eprintln!("🧰 MCP bridge: not configured"),
    }
    eprintln!("💡 /tool <name> [json] runs a tool, /quit leaves, end a line with \\ to continue it");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = String::new();

    loop {
        if pending.is_empty() {
            print!("> ");
        } else {
            print!(". ");
        }
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(event) = next_event(&mut events) => {
                if notifications {
                    if let Some(text) = describe_event(&event) {
                        eprintln!("\r{text}");
                    }
                }
                continue;
            }
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else {
            break;
        };

        match classify_line(&pending, &line) {
            ChatInput::Quit => break,
            ChatInput::Empty => continue,
            ChatInput::Continue(text) => {
                pending = text;
                continue;
            }
            ChatInput::ToggleLog => match session.logging_mut().toggle_logging() {
                Ok(message) => eprintln!("{message}"),
                Err(err) => eprintln!("⚠️  {err}"),
            },
            ChatInput::Status => match &relay {
                Some(relay) => match relay.status().await {
                    Ok(status) => eprintln!(
                        "MCP: {} connection(s), {} active; log: {}",
                        status.total,
                        status.active,
                        session.logging_mut().get_status_string()
                    ),
                    Err(err) => eprintln!("⚠️  {err}"),
                },
                None => eprintln!("MCP: not configured"),
            },
            ChatInput::Message(text) => {
                pending.clear();
                send(&mut session, &text, streaming).await;
            }
        }
    }

    if let Some(relay) = relay {
        relay.shutdown().await;
    }
    Ok(())
}

async fn send(session: &mut ChatSession, text: &str, streaming: bool) {
    let before = session.conversation().len();
    let mut stdout = io::stdout();
    let result = session
        .send(text, |delta| {
            print!("{delta}");
            let _ = stdout.flush();
        })
        .await;

    // Skip the user's own message; show what the exchange added.
    for message in session.conversation().messages().iter().skip(before + 1) {
        match message.role {
            Role::System => println!("## {}", message.text),
            Role::Assistant if streaming => println!(),
            Role::Assistant => println!("{}", message.text),
            Role::User => {}
        }
    }
    if let Err(err) = result {
        debug!(error = %err, "Chat turn failed");
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<McpEvent>>) -> Option<McpEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
