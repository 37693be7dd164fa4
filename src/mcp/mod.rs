pub mod connection;
pub mod correlator;
pub mod error;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod registry;

pub use connection::{test_mcp_connection, ConnectionId, ConnectionOptions, ConnectionStatus, McpConnection};
pub use error::McpError;
pub use events::McpEvent;
pub use manager::McpManager;
pub use registry::McpStatus;
