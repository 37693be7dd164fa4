//! mcp-chat-relay relays chat between a user, an LLM HTTP API and an MCP tool
//! server reached over a WebSocket bridge.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`mcp`] owns the WebSocket sessions: connect and auth, keep-alive,
//!   tool-call correlation, the connection registry and reconnects.
//! - [`core`] holds settings, provider request shapes, the LLM client and
//!   streaming decoder, the conversation model, the relay controller and the
//!   chat session that ties them together.
//! - [`api`] defines the request payloads sent to LLM providers.
//! - [`utils`] carries URL helpers, auth headers and the transcript logger.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
