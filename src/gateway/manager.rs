//! Per-session connection lifecycle.
//!
//! `ConnectionManager` owns at most one live stream per session id and at most
//! one pending reconnect timer per session id. Each live stream runs in its own
//! tokio task that feeds inbound frames to the event handler in arrival order.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::store::{ConnectionStatus, SessionStore, SharedStore};

use super::event_handler;
use super::transport::{Connection, Connector, WsConnector};

/// Instructions from the manager to a socket task.
#[derive(Debug)]
pub(super) enum SocketCommand {
    Send(String),
    Close,
}

/// Handle to one live (or opening) session stream.
struct LiveSocket {
    /// Distinguishes this stream from earlier/later ones for the same session
    generation: u64,
    commands: mpsc::UnboundedSender<SocketCommand>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Pending reconnect for one session.
struct ReconnectTimer {
    /// Lets a woken timer tell whether it is still the one registered
    token: u64,
    task: JoinHandle<()>,
}

struct Inner {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    store: SharedStore,
    sockets: Mutex<HashMap<String, LiveSocket>>,
    reconnect_timers: Mutex<HashMap<String, ReconnectTimer>>,
    next_generation: AtomicU64,
}

/// Opens, tracks and reconnects session streams.
///
/// Must be used from within a tokio runtime: connecting and reconnecting spawn
/// tasks.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: GatewayConfig, connector: Arc<dyn Connector>, store: SharedStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                store,
                sockets: Mutex::new(HashMap::new()),
                reconnect_timers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Manager speaking WebSocket to the configured gateway, with a fresh store.
    pub fn websocket(config: GatewayConfig) -> Self {
        Self::new(
            config,
            Arc::new(WsConnector),
            SessionStore::new().into_shared(),
        )
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.inner.store)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Open the session's stream unless one is already live or opening.
    pub fn connect(&self, session_id: &str) {
        self.inner.connect(session_id);
    }

    /// Close the session's stream and cancel any pending reconnect.
    pub fn disconnect(&self, session_id: &str) {
        self.inner.disconnect(session_id);
    }

    /// Disconnect every session that is live or waiting to reconnect.
    pub fn disconnect_all(&self) {
        let mut ids: HashSet<String> = self.inner.sockets.lock().keys().cloned().collect();
        ids.extend(self.inner.reconnect_timers.lock().keys().cloned());

        for id in ids {
            self.inner.disconnect(&id);
        }
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.inner
            .sockets
            .lock()
            .get(session_id)
            .map(|s| s.open.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn has_pending_reconnect(&self, session_id: &str) -> bool {
        self.inner.reconnect_timers.lock().contains_key(session_id)
    }

    /// Sessions with a live or opening stream.
    pub fn live_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.sockets.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Command channel of the session's stream, only while it is open.
    pub(super) fn open_channel(
        &self,
        session_id: &str,
    ) -> Option<mpsc::UnboundedSender<SocketCommand>> {
        let sockets = self.inner.sockets.lock();
        let socket = sockets.get(session_id)?;
        if socket.open.load(Ordering::SeqCst) {
            Some(socket.commands.clone())
        } else {
            None
        }
    }
}

impl Inner {
    fn connect(self: &Arc<Self>, session_id: &str) {
        // Held until the socket is registered so a fast-failing task cannot
        // run its close path before the entry exists.
        let mut sockets = self.sockets.lock();
        if sockets.contains_key(session_id) {
            return;
        }

        {
            let mut store = self.store.lock();
            store.ensure_session(session_id);
            store.set_connection_status(session_id, ConnectionStatus::Connecting);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        log::info!("Connecting session {}", session_id);
        let task = tokio::spawn(Arc::clone(self).run_socket(
            session_id.to_string(),
            generation,
            command_rx,
            Arc::clone(&open),
        ));

        sockets.insert(
            session_id.to_string(),
            LiveSocket {
                generation,
                commands,
                open,
                task,
            },
        );
    }

    fn disconnect(&self, session_id: &str) {
        // Lock order everywhere: timers, sockets, store.
        let mut timers = self.reconnect_timers.lock();
        if let Some(timer) = timers.remove(session_id) {
            timer.task.abort();
        }

        let socket = self.sockets.lock().remove(session_id);
        if let Some(socket) = socket {
            if socket.open.load(Ordering::SeqCst) {
                // Let the task send a close frame on its way out
                let _ = socket.commands.send(SocketCommand::Close);
            } else {
                socket.task.abort();
            }
            log::info!("Disconnected session {}", session_id);
        }

        self.store
            .lock()
            .set_connection_status(session_id, ConnectionStatus::Disconnected);
    }

    async fn run_socket(
        self: Arc<Self>,
        session_id: String,
        generation: u64,
        mut commands: mpsc::UnboundedReceiver<SocketCommand>,
        open: Arc<AtomicBool>,
    ) {
        let url = self.config.session_url(&session_id);
        let Connection {
            mut sink,
            mut stream,
        } = match self.connector.connect(&url).await {
            Ok(connection) => connection,
            Err(e) => {
                log::warn!("Session {} failed to connect: {}", session_id, e);
                self.on_close(&session_id, generation);
                return;
            }
        };

        if !self.on_open(&session_id, generation, &open) {
            // Disconnected while the handshake was in flight
            let _ = sink.close().await;
            return;
        }

        let closed_by_client = loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SocketCommand::Send(payload)) => {
                        if let Err(e) = sink.send(payload).await {
                            log::warn!("Session {} send failed: {}", session_id, e);
                            break false;
                        }
                    }
                    Some(SocketCommand::Close) | None => {
                        let _ = sink.close().await;
                        break true;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.on_message(&session_id, &text),
                    Some(Err(e)) => {
                        log::warn!("Session {} stream error: {}", session_id, e);
                        break false;
                    }
                    None => break false,
                },
            }
        };

        open.store(false, Ordering::SeqCst);
        if !closed_by_client {
            self.on_close(&session_id, generation);
        }
    }

    fn on_open(&self, session_id: &str, generation: u64, open: &AtomicBool) -> bool {
        let mut timers = self.reconnect_timers.lock();
        let sockets = self.sockets.lock();
        if sockets.get(session_id).map(|s| s.generation) != Some(generation) {
            return false;
        }

        open.store(true, Ordering::SeqCst);
        if let Some(timer) = timers.remove(session_id) {
            timer.task.abort();
        }
        self.store
            .lock()
            .set_connection_status(session_id, ConnectionStatus::Connected);
        log::info!("Session {} connected", session_id);
        true
    }

    fn on_message(&self, session_id: &str, raw: &str) {
        let mut store = self.store.lock();
        if let Err(e) = event_handler::handle_frame(&mut store, session_id, raw) {
            log::debug!("Dropping malformed frame for {}: {}", session_id, e);
        }
    }

    fn on_close(self: &Arc<Self>, session_id: &str, generation: u64) {
        let mut timers = self.reconnect_timers.lock();
        {
            let mut sockets = self.sockets.lock();
            if sockets.get(session_id).map(|s| s.generation) != Some(generation) {
                // Replaced or explicitly disconnected
                return;
            }
            sockets.remove(session_id);
        }

        self.store
            .lock()
            .set_connection_status(session_id, ConnectionStatus::Disconnected);
        self.schedule_reconnect(&mut timers, session_id);
    }

    /// Arm the session's reconnect timer unless one is already pending.
    fn schedule_reconnect(
        self: &Arc<Self>,
        timers: &mut HashMap<String, ReconnectTimer>,
        session_id: &str,
    ) {
        if timers.contains_key(session_id) {
            return;
        }

        let delay = self.config.reconnect_delay();
        log::debug!("Reconnecting session {} in {:?}", session_id, delay);

        let token = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        let id = session_id.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire_reconnect(&id, token);
        });
        timers.insert(session_id.to_string(), ReconnectTimer { token, task });
    }

    fn fire_reconnect(self: &Arc<Self>, session_id: &str, token: u64) {
        // Held through `connect` so a concurrent disconnect either cancels this
        // timer first or sees the new socket afterwards.
        let mut timers = self.reconnect_timers.lock();
        if timers.get(session_id).map(|t| t.token) != Some(token) {
            // Cancelled after the sleep finished
            return;
        }
        timers.remove(session_id);

        if !self.store.lock().has_session(session_id) {
            log::debug!("Session {} was removed, not reconnecting", session_id);
            return;
        }
        self.connect(session_id);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::transport::{MockConnector, TransportError};
    use crate::store::{RunStatus, StoreChange};
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Server end of an in-memory session stream.
    pub(crate) struct FakeServer {
        pub url: String,
        pub to_client: fmpsc::UnboundedSender<Result<String, TransportError>>,
        pub from_client: fmpsc::UnboundedReceiver<String>,
    }

    impl FakeServer {
        pub fn push(&self, frame: serde_json::Value) {
            self.to_client
                .unbounded_send(Ok(frame.to_string()))
                .expect("client stream open");
        }
    }

    /// Connector that hands the server end of each stream to the test.
    pub(crate) struct ChannelConnector {
        servers: mpsc::UnboundedSender<FakeServer>,
        pub attempts: AtomicUsize,
    }

    impl ChannelConnector {
        pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeServer>) {
            let (servers, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    servers,
                    attempts: AtomicUsize::new(0),
                }),
                rx,
            )
        }
    }

    #[async_trait]
    impl Connector for ChannelConnector {
        async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (to_client, client_rx) = fmpsc::unbounded();
            let (client_tx, from_client) = fmpsc::unbounded();
            let _ = self.servers.send(FakeServer {
                url: url.to_string(),
                to_client,
                from_client,
            });
            Ok(Connection {
                sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
                stream: Box::pin(client_rx),
            })
        }
    }

    /// Connector whose gateway never accepts.
    #[derive(Default)]
    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<Connection, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connect("refused".to_string()))
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            gateway_url: "ws://gateway.test".to_string(),
            reconnect_delay_ms: 2000,
        }
    }

    fn manager_with(connector: Arc<dyn Connector>) -> ConnectionManager {
        ConnectionManager::new(test_config(), connector, SessionStore::new().into_shared())
    }

    /// Let spawned tasks run until they block.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn status(manager: &ConnectionManager, id: &str) -> Option<ConnectionStatus> {
        manager.store().lock().connection_status(id)
    }

    // ── connect ──────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn connect_opens_session_url_and_marks_connected() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector);

        manager.connect("s1");
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Connecting));

        let server = servers.recv().await.unwrap();
        settle().await;

        assert_eq!(server.url, "ws://gateway.test/ws/agent/browser/s1");
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Connected));
        assert!(manager.is_connected("s1"));
        assert!(manager.store().lock().has_session("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_opens_one_stream() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());
        let mut changes = manager.store().lock().subscribe();

        manager.connect("s1");
        manager.connect("s1");
        let _server = servers.recv().await.unwrap();
        settle().await;
        manager.connect("s1");
        settle().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(servers.try_recv().is_err());

        let mut transitions = Vec::new();
        while let Ok(change) = changes.try_recv() {
            if let StoreChange::Connection(_, status) = change {
                transitions.push(status);
            }
        }
        assert_eq!(
            transitions,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_reach_the_store_in_order() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector);

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        server.push(serde_json::json!({"type": "stream_event", "event": {"type": "message_start"}}));
        for part in ["Hel", "lo ", "world"] {
            server.push(serde_json::json!({
                "type": "stream_event",
                "event": {"type": "content_block_delta", "delta": {"type": "text_delta", "text": part}}
            }));
        }
        settle().await;

        let store = manager.store();
        let store = store.lock();
        assert_eq!(store.streaming_text("s1"), Some("Hello world"));
        assert_eq!(store.run_status("s1"), Some(RunStatus::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped_without_closing() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector);

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        server.to_client.unbounded_send(Ok("{nope".to_string())).unwrap();
        server.push(serde_json::json!({"type": "error", "message": "still here"}));
        settle().await;

        assert!(manager.is_connected("s1"));
        assert_eq!(manager.store().lock().messages("s1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_usage_counts_do_not_kill_the_stream() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector);

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        server.push(serde_json::json!({
            "type": "result",
            "data": {
                "is_error": false,
                "modelUsage": {"opus": {"inputTokens": u64::MAX, "outputTokens": 1, "contextWindow": 1000}}
            }
        }));
        server.push(serde_json::json!({"type": "error", "message": "after"}));
        settle().await;

        assert!(manager.is_connected("s1"));
        let store = manager.store();
        let store = store.lock();
        assert_eq!(store.session("s1").unwrap().context_used_percent, 100);
        assert_eq!(store.messages("s1").len(), 1);
    }

    // ── reconnect ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn dropped_stream_reconnects_after_delay() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        settle().await;

        drop(server);
        settle().await;
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
        assert!(manager.has_pending_reconnect("s1"));
        assert!(manager.live_sessions().is_empty());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let _server = servers.recv().await.unwrap();
        settle().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Connected));
        assert!(!manager.has_pending_reconnect("s1"));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_session_is_not_reconnected() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        settle().await;
        drop(server);
        settle().await;
        assert!(manager.has_pending_reconnect("s1"));

        manager.store().lock().remove_session("s1");
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(!manager.has_pending_reconnect("s1"));
        assert!(!manager.store().lock().has_session("s1"));
        assert!(manager.live_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_schedules_retry() {
        let mut mock = MockConnector::new();
        mock.expect_connect()
            .withf(|url| url.ends_with("/ws/agent/browser/s1"))
            .times(2)
            .returning(|_| Err(TransportError::Connect("refused".to_string())));
        let manager = manager_with(Arc::new(mock));

        manager.connect("s1");
        settle().await;
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
        assert!(manager.has_pending_reconnect("s1"));

        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert!(manager.has_pending_reconnect("s1"));

        // Stop before a third attempt
        manager.disconnect("s1");
        assert!(!manager.has_pending_reconnect("s1"));
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_init_after_removal_does_not_revive_session() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        settle().await;

        manager.store().lock().remove_session("s1");
        server.push(serde_json::json!({"type": "session_init", "session": {"session_id": "s1"}}));
        settle().await;
        assert!(!manager.store().lock().has_session("s1"));

        drop(server);
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert!(!manager.store().lock().has_session("s1"));
        assert!(manager.live_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_manual_connect_keeps_single_timer() {
        let connector = Arc::new(RefusingConnector::default());
        let manager = manager_with(connector.clone());
        let attempts = || connector.attempts.load(Ordering::SeqCst);

        manager.connect("s1");
        settle().await;
        assert_eq!(attempts(), 1);
        assert!(manager.has_pending_reconnect("s1"));

        // Timer armed at t=0 is due at t=2000
        tokio::time::sleep(Duration::from_millis(1000)).await;
        manager.connect("s1");
        settle().await;
        assert_eq!(attempts(), 2);
        assert_eq!(manager.inner.reconnect_timers.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(999)).await;
        settle().await;
        assert_eq!(attempts(), 2);

        tokio::time::sleep(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(attempts(), 3);

        // Nothing was armed for t=3000 by the manual attempt
        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(attempts(), 3);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(attempts(), 4);
        assert_eq!(manager.inner.reconnect_timers.lock().len(), 1);

        manager.disconnect("s1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_while_timer_fires_stops_reconnecting() {
        let connector = Arc::new(RefusingConnector::default());
        let manager = ConnectionManager::new(
            GatewayConfig {
                gateway_url: "ws://gateway.test".to_string(),
                reconnect_delay_ms: 50,
            },
            connector.clone(),
            SessionStore::new().into_shared(),
        );

        manager.connect("s1");
        for _ in 0..200 {
            if manager.has_pending_reconnect("s1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.has_pending_reconnect("s1"));

        // Park the woken timer behind the store lock, then disconnect from
        // another thread while it waits.
        let store = manager.store();
        let guard = store.lock();
        std::thread::sleep(Duration::from_millis(150));
        let disconnecting = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.disconnect("s1"))
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);
        disconnecting.join().unwrap();

        let settled = connector.attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), settled);
        assert!(!manager.has_pending_reconnect("s1"));
        assert!(manager.live_sessions().is_empty());
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
    }

    // ── disconnect ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_stream_without_reconnecting() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("s1");
        let mut server = servers.recv().await.unwrap();
        settle().await;

        manager.disconnect("s1");
        settle().await;

        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
        assert!(!manager.is_connected("s1"));
        // Client side of the stream was closed
        assert_eq!(server.from_client.next().await, None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        // Idempotent
        manager.disconnect("s1");
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("s1");
        let server = servers.recv().await.unwrap();
        settle().await;
        drop(server);
        settle().await;
        assert!(manager.has_pending_reconnect("s1"));

        manager.disconnect("s1");
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(status(&manager, "s1"), Some(ConnectionStatus::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_all_covers_live_and_waiting_sessions() {
        let (connector, mut servers) = ChannelConnector::new();
        let manager = manager_with(connector.clone());

        manager.connect("live");
        manager.connect("waiting");
        let first = servers.recv().await.unwrap();
        let second = servers.recv().await.unwrap();
        settle().await;

        let (waiting, _live) = if first.url.ends_with("/waiting") {
            (first, second)
        } else {
            (second, first)
        };
        drop(waiting);
        settle().await;
        assert!(manager.has_pending_reconnect("waiting"));

        manager.disconnect_all();
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert!(manager.live_sessions().is_empty());
        assert!(!manager.has_pending_reconnect("waiting"));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(status(&manager, "live"), Some(ConnectionStatus::Disconnected));
        assert_eq!(status(&manager, "waiting"), Some(ConnectionStatus::Disconnected));
    }
}
