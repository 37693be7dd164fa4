pub mod data;
pub mod defaults;
pub mod io;

pub use data::{LlmSettings, McpSettings, Settings, UiSettings};
pub use io::ConfigError;
