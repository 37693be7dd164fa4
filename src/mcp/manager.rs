//! Connection Manager: owns the registry, the reconnect task and the
//! health sweep.

use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::McpSettings;
use crate::mcp::connection::{connect, ConnectionId, ConnectionOptions, McpConnection};
use crate::mcp::error::McpError;
use crate::mcp::events::{ConnectionSignal, McpEvent};
use crate::mcp::registry::{ConnectionRegistry, McpStatus};

pub const SUSPEND_REASON: &str = "Extension suspending";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct ScheduledReconnect {
    generation: u64,
    cancel: CancellationToken,
}

/// Outcome of one [`McpManager::health_check`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub pinged: usize,
    pub purged: Vec<ConnectionId>,
}

pub struct McpManager {
    settings: McpSettings,
    options: ConnectionOptions,
    registry: ConnectionRegistry,
    signals_tx: mpsc::UnboundedSender<ConnectionSignal>,
    signals_rx: mpsc::UnboundedReceiver<ConnectionSignal>,
    reconnect: Option<ScheduledReconnect>,
    generation: u64,
    failed_attempts: u32,
    shutting_down: bool,
    /// URL and token of the last explicit connect; reconnects reuse them.
    target: Option<(String, String)>,
}

impl McpManager {
    pub fn new(settings: &McpSettings) -> Self {
        Self::with_options(settings, ConnectionOptions::from_settings(settings))
    }

    pub fn with_options(settings: &McpSettings, options: ConnectionOptions) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Self {
            settings: settings.clone(),
            options,
            registry: ConnectionRegistry::new(),
            signals_tx,
            signals_rx,
            reconnect: None,
            generation: 0,
            failed_attempts: 0,
            shutting_down: false,
            target: None,
        }
    }

    pub fn settings(&self) -> &McpSettings {
        &self.settings
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Connect to the configured endpoint and register the connection.
    pub async fn connect(&mut self) -> Result<McpConnection, McpError> {
        let url = self.settings.endpoint.trim().to_string();
        let token = self.settings.auth_token.clone();
        self.connect_with(&url, &token).await
    }

    /// Connect to an explicit endpoint; later reconnects reuse `url` and `auth_token`.
    pub async fn connect_with(&mut self, url: &str, auth_token: &str) -> Result<McpConnection, McpError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(McpError::NotConnected);
        }
        self.cancel_reconnect();
        self.shutting_down = false;
        self.target = Some((url.to_string(), auth_token.to_string()));
        match connect(url, auth_token, &self.options, self.signals_tx.clone()).await {
            Ok(connection) => {
                self.failed_attempts = 0;
                self.registry.insert(connection.clone());
                Ok(connection)
            }
            Err(err) => {
                if matches!(
                    err,
                    McpError::ConnectTimeout { .. } | McpError::ConnectRefused { .. }
                ) {
                    self.failed_attempts = self.failed_attempts.saturating_add(1);
                    debug!(error = %err, attempt = self.failed_attempts, "MCP connect failed");
                    self.schedule_reconnect();
                }
                Err(err)
            }
        }
    }

    /// Wait for the next side-channel event, applying registry bookkeeping
    /// (removal on close, reconnect scheduling) on the way.
    ///
    /// Cancel-safe: nothing is lost if the returned future is dropped.
    pub async fn next_event(&mut self) -> Option<McpEvent> {
        loop {
            let signal = self.signals_rx.recv().await?;
            match signal {
                ConnectionSignal::Event(event) => return Some(event),
                ConnectionSignal::Closed {
                    connection_id,
                    requested,
                } => {
                    self.registry.remove(&connection_id);
                    let will_reconnect = !requested
                        && (self.schedule_reconnect() || self.reconnect_pending());
                    return Some(McpEvent::Disconnected {
                        connection_id,
                        will_reconnect,
                    });
                }
                ConnectionSignal::Reconnected { generation, result } => {
                    if let Some(event) = self.finish_reconnect(generation, result) {
                        return Some(event);
                    }
                }
            }
        }
    }

    fn finish_reconnect(
        &mut self,
        generation: u64,
        result: Result<McpConnection, McpError>,
    ) -> Option<McpEvent> {
        let current = self
            .reconnect
            .as_ref()
            .is_some_and(|scheduled| scheduled.generation == generation);
        if !current {
            debug!(generation, "Discarding stale reconnect result");
            if let Ok(connection) = result {
                connection.close("Superseded");
            }
            return None;
        }
        self.reconnect = None;

        match result {
            Ok(connection) => {
                info!(connection_id = %connection.id(), "MCP reconnected");
                self.failed_attempts = 0;
                self.registry.insert(connection);
                None
            }
            Err(err) => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                debug!(error = %err, attempt = self.failed_attempts, "MCP reconnect failed");
                let attempt = self.failed_attempts;
                self.schedule_reconnect();
                Some(McpEvent::ReconnectFailed {
                    error: err.to_string(),
                    attempt,
                })
            }
        }
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Schedule one reconnect attempt. Returns false when auto-reconnect is
    /// off, the manager is shutting down, or an attempt is already pending.
    pub fn schedule_reconnect(&mut self) -> bool {
        if !self.options.auto_reconnect || self.shutting_down || self.reconnect.is_some() {
            return false;
        }
        let Some((url, token)) = self.target.clone() else {
            return false;
        };

        self.generation += 1;
        let generation = self.generation;
        let delay = self.options.reconnect_delay_for(self.failed_attempts);
        let cancel = CancellationToken::new();
        self.reconnect = Some(ScheduledReconnect {
            generation,
            cancel: cancel.clone(),
        });

        let options = self.options.clone();
        let signals = self.signals_tx.clone();
        debug!(generation, delay_ms = delay.as_millis(), url = %url, "Scheduling MCP reconnect");
        let _ = signals.send(ConnectionSignal::Event(McpEvent::ReconnectScheduled {
            delay,
            attempt: self.failed_attempts,
        }));

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = connect(&url, &token, &options, signals.clone()) => result,
            };
            let _ = signals.send(ConnectionSignal::Reconnected { generation, result });
        });
        true
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(scheduled) = self.reconnect.take() {
            debug!(generation = scheduled.generation, "Cancelling MCP reconnect");
            scheduled.cancel.cancel();
        }
    }

    /// Swap in new settings. Returns true when the endpoint or token changed,
    /// in which case the caller should reconnect.
    pub fn update_settings(&mut self, settings: &McpSettings) -> bool {
        let changed = settings.endpoint.trim() != self.settings.endpoint.trim()
            || settings.auth_token != self.settings.auth_token;
        self.settings = settings.clone();
        self.options = ConnectionOptions::from_settings(settings);
        if changed || !self.options.auto_reconnect {
            self.cancel_reconnect();
        }
        if changed {
            self.target = None;
        }
        changed
    }

    /// Ping every open connection, then purge the ones that are not open.
    pub fn health_check(&mut self) -> HealthReport {
        let mut pinged = 0;
        for connection in self.registry.iter() {
            if !connection.is_open() {
                continue;
            }
            match connection.ping() {
                Ok(()) => pinged += 1,
                Err(err) => {
                    debug!(connection_id = %connection.id(), error = %err, "MCP ping failed");
                    connection.mark_closed();
                }
            }
        }
        let purged = self.registry.sweep_closed();
        if !purged.is_empty() {
            debug!(count = purged.len(), "Purged closed MCP connections");
        }
        HealthReport { pinged, purged }
    }

    pub fn primary(&self) -> Option<&McpConnection> {
        self.registry.primary()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&McpConnection> {
        self.registry.get(id)
    }

    pub fn status(&self) -> McpStatus {
        self.registry.snapshot()
    }

    /// Send a raw frame to `id`, or to the primary connection.
    pub fn send_raw(&self, id: Option<&ConnectionId>, frame: &Value) -> Result<(), McpError> {
        let connection = match id {
            Some(id) => self.registry.get(id),
            None => self.registry.primary(),
        }
        .ok_or(McpError::NotConnected)?;
        connection.send_raw(frame)
    }

    /// Close every connection with `reason`, drop them, and cancel any
    /// pending reconnect. Waits briefly for the close frames to go out.
    pub async fn close_all(&mut self, reason: &str) {
        self.cancel_reconnect();
        let closing = self.registry.close_all(reason);
        let waits = closing.iter().map(McpConnection::closed);
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, join_all(waits)).await;
    }

    /// Suspend: no further reconnects, every socket closed normally.
    pub async fn shutdown(&mut self) {
        self.shutting_down = true;
        self.close_all(SUSPEND_REASON).await;
    }
}

impl Drop for McpManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::connection::test_support::{bridge_handler, spawn_ws_server};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::Message;

    fn settings(url: &str) -> McpSettings {
        McpSettings {
            endpoint: url.to_string(),
            ..McpSettings::default()
        }
    }

    fn fast_options() -> ConnectionOptions {
        ConnectionOptions {
            connect_timeout: Duration::from_secs(2),
            tool_call_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(100),
            ..ConnectionOptions::default()
        }
    }

    async fn expect_event<F>(manager: &mut McpManager, mut matches: F) -> McpEvent
    where
        F: FnMut(&McpEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = manager.next_event().await.expect("event channel open");
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event should arrive in time")
    }

    /// First connection is dropped by the server right away; later ones stay up.
    async fn flaky_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if count == 1 {
                    let _ = ws.close(None).await;
                } else {
                    held.push(ws);
                }
            }
        });

        (format!("ws://{addr}/mcp"), accepted)
    }

    #[tokio::test]
    async fn failed_first_connect_keeps_retrying_in_background() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let mut manager =
            McpManager::with_options(&settings(&format!("ws://{addr}/mcp")), fast_options());
        let err = manager.connect().await.expect_err("nothing is listening");
        assert!(matches!(err, McpError::ConnectRefused { .. }));
        assert!(manager.reconnect_pending());
        assert!(!manager.schedule_reconnect(), "only one reconnect may be pending");

        let scheduled = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::ReconnectScheduled { .. })
        })
        .await;
        assert_eq!(
            scheduled,
            McpEvent::ReconnectScheduled {
                delay: Duration::from_millis(100),
                attempt: 1,
            }
        );
        let failed = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::ReconnectFailed { .. })
        })
        .await;
        assert!(matches!(failed, McpEvent::ReconnectFailed { attempt: 2, .. }));
        assert!(manager.reconnect_pending());

        manager.shutdown().await;
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test]
    async fn failed_connect_without_auto_reconnect_stays_idle() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let options = ConnectionOptions {
            auto_reconnect: false,
            ..fast_options()
        };
        let mut manager =
            McpManager::with_options(&settings(&format!("ws://{addr}/mcp")), options);
        assert!(manager.connect().await.is_err());
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test]
    async fn unexpected_close_schedules_exactly_one_reconnect() {
        let (url, accepted) = flaky_server().await;
        let mut manager = McpManager::with_options(&settings(&url), fast_options());
        let first = manager.connect().await.expect("initial connect");

        let disconnected = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::Disconnected { .. })
        })
        .await;
        assert_eq!(
            disconnected,
            McpEvent::Disconnected {
                connection_id: first.id().clone(),
                will_reconnect: true,
            }
        );
        assert!(manager.reconnect_pending());
        assert!(!manager.schedule_reconnect(), "only one reconnect may be pending");

        let scheduled = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::ReconnectScheduled { .. })
        })
        .await;
        assert_eq!(
            scheduled,
            McpEvent::ReconnectScheduled {
                delay: Duration::from_millis(100),
                attempt: 0,
            }
        );

        let connected = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::Connected { .. })
        })
        .await;
        let McpEvent::Connected { connection_id, .. } = connected else {
            unreachable!();
        };
        assert_ne!(&connection_id, first.id());

        // Let the reconnect result land, then make sure nothing else fires.
        tokio::time::sleep(Duration::from_millis(300)).await;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(50), manager.next_event()).await
        {}
        assert!(!manager.reconnect_pending());
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(manager.status().active, 1);
        assert_eq!(
            manager.primary().map(|connection| connection.id().clone()),
            Some(connection_id)
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn requested_close_does_not_reconnect() {
        let (url, _seen) = spawn_ws_server(bridge_handler).await;
        let mut manager = McpManager::with_options(&settings(&url), fast_options());
        let connection = manager.connect().await.expect("connect");

        connection.close("bye");
        let event = expect_event(&mut manager, |event| {
            matches!(event, McpEvent::Disconnected { .. })
        })
        .await;
        assert!(matches!(
            event,
            McpEvent::Disconnected {
                will_reconnect: false,
                ..
            }
        ));
        assert!(!manager.reconnect_pending());
        assert!(manager.status().connections.is_empty());
    }

    #[tokio::test]
    async fn disabling_auto_reconnect_cancels_pending_attempt() {
        let (url, accepted) = flaky_server().await;
        let mut options = fast_options();
        options.reconnect_delay = Duration::from_millis(300);
        options.reconnect_max_delay = Duration::from_millis(300);
        let mut manager = McpManager::with_options(&settings(&url), options);
        manager.connect().await.expect("connect");

        expect_event(&mut manager, |event| {
            matches!(event, McpEvent::Disconnected { .. })
        })
        .await;
        assert!(manager.reconnect_pending());

        let disabled = McpSettings {
            auto_reconnect: false,
            ..settings(&url)
        };
        assert!(!manager.update_settings(&disabled));
        assert!(!manager.reconnect_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_settings_reports_endpoint_changes() {
        let mut manager = McpManager::new(&settings("ws://localhost:8080/mcp"));
        assert!(!manager.update_settings(&settings("ws://localhost:8080/mcp")));
        assert!(manager.update_settings(&settings("ws://localhost:9090/mcp")));
        let with_token = McpSettings {
            auth_token: "new".to_string(),
            ..settings("ws://localhost:9090/mcp")
        };
        assert!(manager.update_settings(&with_token));
    }

    #[tokio::test]
    async fn health_check_pings_and_purges() {
        let (url, mut seen) = spawn_ws_server(bridge_handler).await;
        let mut manager = McpManager::with_options(&settings(&url), fast_options());
        let first = manager.connect().await.expect("first");
        let second = manager.connect().await.expect("second");

        first.mark_closed();
        let report = manager.health_check();
        assert_eq!(report.pinged, 1);
        assert_eq!(report.purged, vec![first.id().clone()]);
        assert_eq!(manager.status().total, 1);
        assert!(manager.connection(second.id()).is_some());

        loop {
            let Some(Message::Text(text)) = seen.recv().await else {
                continue;
            };
            if serde_json::from_str::<Value>(&text).ok() == Some(json!({"type": "ping"})) {
                break;
            }
        }
    }

    #[tokio::test]
    async fn shutdown_closes_with_normal_code_and_clears() {
        let (url, mut seen) = spawn_ws_server(bridge_handler).await;
        let mut manager = McpManager::with_options(&settings(&url), fast_options());
        let connection = manager.connect().await.expect("connect");

        manager.shutdown().await;
        assert!(manager.status().connections.is_empty());
        assert!(!connection.is_open());
        assert!(!manager.schedule_reconnect());

        loop {
            if let Some(Message::Close(Some(frame))) = seen.recv().await {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason, SUSPEND_REASON);
                break;
            }
        }
    }

    #[tokio::test]
    async fn send_raw_targets_primary_or_named_connection() {
        let (url, mut seen) = spawn_ws_server(bridge_handler).await;
        let mut manager = McpManager::with_options(&settings(&url), fast_options());

        assert_eq!(
            manager.send_raw(None, &json!({"type": "ping"})),
            Err(McpError::NotConnected)
        );

        let connection = manager.connect().await.expect("connect");
        manager
            .send_raw(Some(connection.id()), &json!({"type": "custom", "n": 1}))
            .expect("send");
        loop {
            let Some(Message::Text(text)) = seen.recv().await else {
                continue;
            };
            let frame: Value = serde_json::from_str(&text).expect("json");
            if frame["type"] == "custom" {
                assert_eq!(frame["n"], 1);
                break;
            }
        }
    }
}
