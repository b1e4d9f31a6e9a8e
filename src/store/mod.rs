//! In-memory session store.
//!
//! Single source of truth for everything the UI shows about a session. Every
//! mutation publishes a `StoreChange` so subscribers can re-read the slice they
//! care about. Derived maps are keyed by session id; writes for a session that
//! is not registered are dropped so that late frames cannot leave orphans.

pub mod types;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use types::{
    ChatMessage, ConnectionStatus, PermissionRequest, Role, RunStatus, SessionPatch, SessionState,
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Store shared between the connection tasks and UI-side readers.
pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Which slice of the store changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Session(String),
    Messages(String),
    Streaming(String),
    Permissions(String),
    Connection(String, ConnectionStatus),
    Backend(String),
    RunStatus(String),
    DisplayName(String),
    Unread(String),
    Removed(String),
    CurrentSession(Option<String>),
}

/// In-progress assistant output. Text and start time live together so one can
/// never be cleared without the other.
#[derive(Debug, Clone)]
struct StreamingState {
    text: String,
    started_at: i64,
}

pub struct SessionStore {
    sessions: HashMap<String, SessionState>,
    messages: HashMap<String, Vec<ChatMessage>>,
    streaming: HashMap<String, StreamingState>,
    pending_permissions: HashMap<String, HashMap<String, PermissionRequest>>,
    connection_status: HashMap<String, ConnectionStatus>,
    backend_connected: HashMap<String, bool>,
    run_status: HashMap<String, RunStatus>,
    display_names: HashMap<String, String>,
    unread: HashMap<String, u32>,
    current_session: Option<String>,
    changes: broadcast::Sender<StoreChange>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            sessions: HashMap::new(),
            messages: HashMap::new(),
            streaming: HashMap::new(),
            pending_permissions: HashMap::new(),
            connection_status: HashMap::new(),
            backend_connected: HashMap::new(),
            run_status: HashMap::new(),
            display_names: HashMap::new(),
            unread: HashMap::new(),
            current_session: None,
            changes,
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    // ── sessions ─────────────────────────────────────────────────────────

    pub fn add_session(&mut self, session: SessionState) {
        let id = session.session_id.clone();
        self.sessions.insert(id.clone(), session);
        self.notify(StoreChange::Session(id));
    }

    /// Register a bare record for `id` unless one already exists.
    pub fn ensure_session(&mut self, id: &str) {
        if !self.sessions.contains_key(id) {
            self.add_session(SessionState::new(id));
        }
    }

    /// Merge `patch` into an existing session. Returns `false` when the
    /// session is unknown, in which case nothing changes.
    pub fn update_session(&mut self, id: &str, patch: SessionPatch) -> bool {
        match self.sessions.get_mut(id) {
            Some(state) => {
                patch.apply_to(state);
                self.notify(StoreChange::Session(id.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn remove_session(&mut self, id: &str) {
        self.sessions.remove(id);
        self.messages.remove(id);
        self.streaming.remove(id);
        self.pending_permissions.remove(id);
        self.connection_status.remove(id);
        self.backend_connected.remove(id);
        self.run_status.remove(id);
        self.display_names.remove(id);
        self.unread.remove(id);

        let was_current = self.current_session.as_deref() == Some(id);
        if was_current {
            self.current_session = None;
        }

        self.notify(StoreChange::Removed(id.to_string()));
        if was_current {
            self.notify(StoreChange::CurrentSession(None));
        }
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn session(&self, id: &str) -> Option<&SessionState> {
        self.sessions.get(id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ── messages ─────────────────────────────────────────────────────────

    pub fn append_message(&mut self, id: &str, message: ChatMessage) {
        if !self.has_session(id) {
            return;
        }
        self.messages.entry(id.to_string()).or_default().push(message);
        self.notify(StoreChange::Messages(id.to_string()));
    }

    /// Replace the whole message sequence. Callers replaying history are
    /// responsible for not shrinking it.
    pub fn set_messages(&mut self, id: &str, messages: Vec<ChatMessage>) {
        if !self.has_session(id) {
            return;
        }
        self.messages.insert(id.to_string(), messages);
        self.notify(StoreChange::Messages(id.to_string()));
    }

    pub fn messages(&self, id: &str) -> &[ChatMessage] {
        self.messages.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    // ── streaming ────────────────────────────────────────────────────────

    /// `Some(text)` sets the in-progress text, `None` clears text and start
    /// time together.
    pub fn set_streaming(&mut self, id: &str, text: Option<String>) {
        match text {
            Some(text) => {
                if !self.has_session(id) {
                    return;
                }
                match self.streaming.get_mut(id) {
                    Some(state) => state.text = text,
                    None => {
                        self.streaming.insert(
                            id.to_string(),
                            StreamingState {
                                text,
                                started_at: chrono::Utc::now().timestamp_millis(),
                            },
                        );
                    }
                }
            }
            None => {
                if self.streaming.remove(id).is_none() {
                    return;
                }
            }
        }
        self.notify(StoreChange::Streaming(id.to_string()));
    }

    /// Begin a fresh assistant utterance: empty text, new start time.
    pub fn start_streaming(&mut self, id: &str) {
        if !self.has_session(id) {
            return;
        }
        self.streaming.insert(
            id.to_string(),
            StreamingState {
                text: String::new(),
                started_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.notify(StoreChange::Streaming(id.to_string()));
    }

    pub fn append_streaming(&mut self, id: &str, delta: &str) {
        if !self.has_session(id) {
            return;
        }
        self.streaming
            .entry(id.to_string())
            .or_insert_with(|| StreamingState {
                text: String::new(),
                started_at: chrono::Utc::now().timestamp_millis(),
            })
            .text
            .push_str(delta);
        self.notify(StoreChange::Streaming(id.to_string()));
    }

    pub fn streaming_text(&self, id: &str) -> Option<&str> {
        self.streaming.get(id).map(|s| s.text.as_str())
    }

    pub fn streaming_started_at(&self, id: &str) -> Option<i64> {
        self.streaming.get(id).map(|s| s.started_at)
    }

    // ── permissions ──────────────────────────────────────────────────────

    pub fn add_permission(&mut self, id: &str, request: PermissionRequest) {
        if !self.has_session(id) {
            return;
        }
        self.pending_permissions
            .entry(id.to_string())
            .or_default()
            .insert(request.request_id.clone(), request);
        self.notify(StoreChange::Permissions(id.to_string()));
    }

    pub fn remove_permission(&mut self, id: &str, request_id: &str) {
        let removed = self
            .pending_permissions
            .get_mut(id)
            .and_then(|map| map.remove(request_id))
            .is_some();
        if removed {
            self.notify(StoreChange::Permissions(id.to_string()));
        }
    }

    pub fn pending_permissions(&self, id: &str) -> Vec<&PermissionRequest> {
        let mut requests: Vec<&PermissionRequest> = self
            .pending_permissions
            .get(id)
            .map(|map| map.values().collect())
            .unwrap_or_default();
        requests.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        requests
    }

    pub fn pending_permission(&self, id: &str, request_id: &str) -> Option<&PermissionRequest> {
        self.pending_permissions.get(id)?.get(request_id)
    }

    // ── connectivity ─────────────────────────────────────────────────────

    pub fn set_connection_status(&mut self, id: &str, status: ConnectionStatus) {
        if !self.has_session(id) {
            return;
        }
        self.connection_status.insert(id.to_string(), status);
        self.notify(StoreChange::Connection(id.to_string(), status));
    }

    pub fn connection_status(&self, id: &str) -> Option<ConnectionStatus> {
        self.connection_status.get(id).copied()
    }

    pub fn set_backend_connected(&mut self, id: &str, connected: bool) {
        if !self.has_session(id) {
            return;
        }
        self.backend_connected.insert(id.to_string(), connected);
        self.notify(StoreChange::Backend(id.to_string()));
    }

    /// `None` when the session is unknown.
    pub fn backend_connected(&self, id: &str) -> Option<bool> {
        self.backend_connected.get(id).copied()
    }

    /// `None` records "no backend / unknown", which is distinct from idle.
    pub fn set_run_status(&mut self, id: &str, status: Option<RunStatus>) {
        if !self.has_session(id) {
            return;
        }
        match status {
            Some(status) => {
                self.run_status.insert(id.to_string(), status);
            }
            None => {
                self.run_status.remove(id);
            }
        }
        self.notify(StoreChange::RunStatus(id.to_string()));
    }

    pub fn run_status(&self, id: &str) -> Option<RunStatus> {
        self.run_status.get(id).copied()
    }

    // ── naming / badges / selection ──────────────────────────────────────

    pub fn set_display_name(&mut self, id: &str, name: impl Into<String>) {
        if !self.has_session(id) {
            return;
        }
        self.display_names.insert(id.to_string(), name.into());
        self.notify(StoreChange::DisplayName(id.to_string()));
    }

    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.display_names.get(id).map(String::as_str)
    }

    pub fn increment_unread(&mut self, id: &str, count: u32) {
        if !self.has_session(id) || count == 0 {
            return;
        }
        *self.unread.entry(id.to_string()).or_insert(0) += count;
        self.notify(StoreChange::Unread(id.to_string()));
    }

    /// Drops the counter entirely; no entry means zero.
    pub fn clear_unread(&mut self, id: &str) {
        if self.unread.remove(id).is_some() {
            self.notify(StoreChange::Unread(id.to_string()));
        }
    }

    pub fn unread_count(&self, id: &str) -> u32 {
        self.unread.get(id).copied().unwrap_or(0)
    }

    pub fn set_current_session(&mut self, id: Option<&str>) {
        self.current_session = id.map(str::to_string);
        if let Some(id) = id {
            self.clear_unread(id);
        }
        self.notify(StoreChange::CurrentSession(self.current_session.clone()));
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
