//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod say;
pub mod settings;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::chat::run_chat;
use crate::cli::config::run_config;
use crate::cli::llm::run_llm;
use crate::cli::mcp::run_mcp;
use crate::cli::say::{run_page_action, run_say};
use crate::core::config::Settings;
use crate::core::prompts::PageAction;

#[derive(Parser)]
#[command(name = "mcp-chat")]
#[command(about = "Chat with an LLM, with tools from an MCP server behind a WebSocket bridge")]
#[command(
    long_about = "mcp-chat relays chat messages between your terminal, an LLM HTTP API \
(Google, OpenAI, Anthropic, a local server or any OpenAI-compatible endpoint) and an MCP \
tool server reached over a WebSocket bridge.\n\n\
Environment Variables (fallback when llm.api-key is empty):\n\
  GEMINI_API_KEY     Key for the google provider\n\
  OPENAI_API_KEY     Key for the openai provider\n\
  ANTHROPIC_API_KEY  Key for the anthropic provider\n\
  RUST_LOG           Diagnostic log filter (default: warn)\n\n\
Chat commands:\n\
  /tool <name> [json]  Run an MCP tool; text on following lines is sent with the result\n\
  /status              Show MCP connection status\n\
  /log                 Toggle transcript logging pause/resume\n\
  /quit                Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append the conversation to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Show debug diagnostics on stderr
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// The prompt to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Ask the model to explain text taken from a page
    Explain(PageArgs),
    /// Ask the model to analyze text taken from a page
    Analyze(PageArgs),
    /// MCP bridge diagnostics and tools
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    /// LLM provider diagnostics
    Llm {
        #[command(subcommand)]
        command: LlmCommands,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct PageArgs {
    /// Title of the page the text came from
    #[arg(long, default_value = "")]
    pub title: String,
    /// URL of the page the text came from
    #[arg(long, default_value = "")]
    pub url: String,
    /// The selected text
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum McpCommands {
    /// Open and close a connection to the configured endpoint
    Test,
    /// List the tools the server offers
    Tools,
    /// Call a tool and print its result
    Call {
        /// Tool name
        tool: String,
        /// Parameters as a JSON value (default: {})
        params: Option<String>,
    },
    /// Show connection status and server status
    Status,
    /// Stay connected and print MCP events until interrupted
    Watch,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum LlmCommands {
    /// Send a tiny prompt to check credentials and endpoint
    Test,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigCommands {
    /// Print every setting
    Show,
    /// Set one setting, e.g. `config set llm.provider openai`
    Set {
        key: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Restore first-install defaults
    Reset,
    /// Print the settings file location
    Path,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Load settings for a run: the persisted file plus environment key fallback.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, Box<dyn Error>> {
    let path = Settings::resolve_path(explicit)?;
    let mut settings = Settings::load_from_path(&path)?;
    settings.apply_env_fallback();
    Ok(settings)
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(load_settings(config_path)?, args.log).await,
        Commands::Say { prompt } => run_say(load_settings(config_path)?, prompt, args.log).await,
        Commands::Explain(page) => {
            run_page_action(load_settings(config_path)?, PageAction::Explain, page, args.log).await
        }
        Commands::Analyze(page) => {
            run_page_action(load_settings(config_path)?, PageAction::Analyze, page, args.log).await
        }
        Commands::Mcp { command } => run_mcp(load_settings(config_path)?, command).await,
        Commands::Llm { command } => run_llm(load_settings(config_path)?, command).await,
        Commands::Config { command } => run_config(config_path, command),
    }
}

#[cfg(test)]
mod tests;
