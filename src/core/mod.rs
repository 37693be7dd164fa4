pub mod chat_stream;
pub mod config;
pub mod llm_client;
pub mod llm_error;
pub mod message;
pub mod prompts;
pub mod providers;
pub mod relay;
pub mod session;
