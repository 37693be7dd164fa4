use serde::Serialize;

use crate::mcp::connection::{ConnectionId, ConnectionStatus, McpConnection};

/// The set of live connections, owned by one manager.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<McpConnection>,
}

/// Status snapshot returned for `get_mcp_status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct McpStatus {
    pub connections: Vec<ConnectionStatus>,
    pub total: usize,
    pub active: usize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: McpConnection) {
        self.connections
            .retain(|existing| existing.id() != connection.id());
        self.connections.push(connection);
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<McpConnection> {
        let index = self
            .connections
            .iter()
            .position(|connection| connection.id() == id)?;
        Some(self.connections.remove(index))
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&McpConnection> {
        self.connections
            .iter()
            .find(|connection| connection.id() == id)
    }

    /// The most recently added connection that is still open.
    pub fn primary(&self) -> Option<&McpConnection> {
        self.connections
            .iter()
            .rev()
            .find(|connection| connection.is_open())
    }

    pub fn iter(&self) -> impl Iterator<Item = &McpConnection> {
        self.connections.iter()
    }

    /// Drop every connection whose transport is no longer open.
    pub fn sweep_closed(&mut self) -> Vec<ConnectionId> {
        let mut removed = Vec::new();
        self.connections.retain(|connection| {
            if connection.is_open() {
                true
            } else {
                removed.push(connection.id().clone());
                false
            }
        });
        removed
    }

    /// Close every connection with `reason` and empty the set.
    pub fn close_all(&mut self, reason: &str) -> Vec<McpConnection> {
        let drained: Vec<McpConnection> = self.connections.drain(..).collect();
        for connection in &drained {
            connection.close(reason);
        }
        drained
    }

    pub fn snapshot(&self) -> McpStatus {
        let connections: Vec<ConnectionStatus> =
            self.connections.iter().map(McpConnection::status).collect();
        let active = connections.iter().filter(|status| status.open).count();
        McpStatus {
            total: connections.len(),
            active,
            connections,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
