use std::error::Error;

use crate::cli::LlmCommands;
use crate::core::config::Settings;
use crate::core::llm_client::LlmClient;

pub async fn run_llm(settings: Settings, command: LlmCommands) -> Result<(), Box<dyn Error>> {
    match command {
        LlmCommands::Test => {
            let provider = settings.llm.provider.clone();
            let model = settings.llm.model.clone();
            match LlmClient::new().test_connection(&settings.llm).await {
                Ok(reply) => {
                    println!("✅ {provider} ({model}) answered: {}", reply.trim());
                    Ok(())
                }
                Err(err) => {
                    eprintln!("❌ LLM connection test failed: {}", err.summary());
                    std::process::exit(1);
                }
            }
        }
    }
}
