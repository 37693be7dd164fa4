//! `mcp` subcommands: connection test, tool listing and calls, status, watch.

use std::error::Error;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::cli::McpCommands;
use crate::core::config::Settings;
use crate::core::relay::{Relay, RelayHandle, RelayRequest, RelayResponse};
use crate::mcp::{test_mcp_connection, McpEvent};

pub async fn run_mcp(settings: Settings, command: McpCommands) -> Result<(), Box<dyn Error>> {
    let endpoint = settings.mcp.endpoint.trim().to_string();
    if endpoint.is_empty() {
        eprintln!("❌ No MCP endpoint configured.");
        eprintln!("Example: mcp-chat config set mcp.endpoint ws://localhost:8080/mcp");
        std::process::exit(1);
    }

    if command == McpCommands::Test {
        return match test_mcp_connection(&endpoint, settings.mcp.connect_timeout()).await {
            Ok(()) => {
                println!("✅ MCP bridge reachable at {endpoint}");
                Ok(())
            }
            Err(err) => {
                eprintln!("❌ {err}");
                std::process::exit(1);
            }
        };
    }

    let (relay, mut events, _task) = Relay::spawn(&settings.mcp);
    if let Err(err) = connect(&relay).await {
        eprintln!("❌ {err}");
        relay.shutdown().await;
        std::process::exit(1);
    }

    let outcome = match command {
        McpCommands::Test => Ok(()),
        McpCommands::Tools => list_tools(&relay).await,
        McpCommands::Call { tool, params } => call_tool(&relay, &tool, params.as_deref()).await,
        McpCommands::Status => print_status(&relay).await,
        McpCommands::Watch => watch(&mut events).await,
    };

    relay.shutdown().await;
    if let Err(err) = outcome {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
    Ok(())
}

/// Connect the relay to its configured endpoint.
pub async fn connect(relay: &RelayHandle) -> Result<(), Box<dyn Error>> {
    match relay
        .request(RelayRequest::ConnectMcp {
            url: None,
            api_key: None,
        })
        .await?
    {
        RelayResponse::Failed { error, .. } => Err(error.into()),
        _ => Ok(()),
    }
}

async fn list_tools(relay: &RelayHandle) -> Result<(), Box<dyn Error>> {
    match relay.request(RelayRequest::ListMcpTools).await? {
        RelayResponse::Tools { tools, .. } => {
            if tools.is_empty() {
                println!("The server offers no tools.");
            }
            for tool in tools {
                match tool.description {
                    Some(description) => println!("  {} - {}", tool.name, description),
                    None => println!("  {}", tool.name),
                }
            }
            Ok(())
        }
        RelayResponse::Failed { error, .. } => Err(error.into()),
        other => Err(format!("Unexpected reply: {other:?}").into()),
    }
}

async fn call_tool(
    relay: &RelayHandle,
    tool: &str,
    params: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let parameters = match params {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| format!("Parameters must be JSON: {err}"))?,
        None => Value::Object(Default::default()),
    };
    let result = relay.call_tool(tool, parameters).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn print_status(relay: &RelayHandle) -> Result<(), Box<dyn Error>> {
    let status = relay.status().await?;
    println!("Connections: {} ({} active)", status.total, status.active);
    for connection in &status.connections {
        println!(
            "  {} {} open={} authenticated={} last-activity={}",
            connection.id,
            connection.url,
            connection.open,
            connection.authenticated,
            connection.last_activity.to_rfc3339()
        );
    }

    if let Some(primary) = relay.primary().await? {
        let server = primary.get_status().await?;
        println!(
            "Server: connected={} mcp-ready={} tools={} clients={}",
            server.connected, server.mcp_ready, server.tools_count, server.connections
        );
    }
    Ok(())
}

async fn watch(events: &mut mpsc::UnboundedReceiver<McpEvent>) -> Result<(), Box<dyn Error>> {
    println!("Watching MCP events (Ctrl+C to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                if let Some(line) = describe_event(&event) {
                    println!("{line}");
                }
            }
        }
    }
}

/// One-line, user-facing rendering of an MCP event. Routine traffic, reconnect
/// failures and the retries that follow them are not shown.
pub fn describe_event(event: &McpEvent) -> Option<String> {
    match event {
        McpEvent::Connected { url, .. } => Some(format!("🔌 Connected to {url}")),
        McpEvent::Welcome { server, tools, .. } => Some(format!(
            "👋 {} offers {} tool(s)",
            server.as_deref().unwrap_or("MCP server"),
            tools.len()
        )),
        McpEvent::AuthSucceeded { .. } => Some("🔑 Authenticated".to_string()),
        McpEvent::AuthFailed { message, .. } => Some(format!(
            "❌ Authentication failed: {}",
            message.as_deref().unwrap_or("no reason given")
        )),
        McpEvent::ServerError { error, .. } => Some(format!("⚠️  Server error: {error}")),
        McpEvent::Disconnected { will_reconnect, .. } => Some(if *will_reconnect {
            "🔌 Disconnected; reconnecting".to_string()
        } else {
            "🔌 Disconnected".to_string()
        }),
        McpEvent::ReconnectScheduled { delay, attempt: 0 } => {
            Some(format!("⏳ Reconnecting in {}s", delay.as_secs()))
        }
        McpEvent::Message { .. }
        | McpEvent::ReconnectScheduled { .. }
        | McpEvent::ReconnectFailed { .. } => None,
    }
}
