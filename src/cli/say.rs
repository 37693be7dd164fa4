//! One-shot "say", "explain" and "analyze" commands

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli::PageArgs;
use crate::core::config::Settings;
use crate::core::llm_client::LlmClient;
use crate::core::prompts::{contextual_prompt, PageAction, PageContext};
use crate::core::session::ChatSession;
use crate::utils::logging::LoggingState;

pub async fn run_say(
    settings: Settings,
    prompt: Vec<String>,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: mcp-chat say <prompt>");
        std::process::exit(1);
    }
    send_once(settings, &prompt, log).await
}

pub async fn run_page_action(
    settings: Settings,
    action: PageAction,
    page: PageArgs,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let text = page.text.join(" ");
    if text.trim().is_empty() {
        eprintln!("Usage: mcp-chat {action} [--title <TITLE>] [--url <URL>] <text>");
        std::process::exit(1);
    }
    let context = PageContext {
        title: page.title,
        url: page.url,
    };
    let prompt = contextual_prompt(action, &text, &context);
    send_once(settings, &prompt, log).await
}

async fn send_once(
    settings: Settings,
    prompt: &str,
    log: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let streaming = settings.llm.streaming;
    let mut session = ChatSession::new(LlmClient::new(), settings.llm)
        .with_logging(LoggingState::new(log)?);

    let mut stdout = io::stdout();
    let result = session
        .send(prompt, |delta| {
            print!("{delta}");
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(reply) => {
            if !streaming {
                if let Some(reply) = reply {
                    print!("{reply}");
                }
            }
            println!();
            Ok(())
        }
        Err(err) => {
            eprintln!("\n❌ Error: {err}");
            std::process::exit(1);
        }
    }
}
