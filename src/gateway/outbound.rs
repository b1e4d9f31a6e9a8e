//! Client-to-gateway commands.

use uuid::Uuid;

use crate::store::{ChatMessage, Role, RunStatus};

use super::manager::{ConnectionManager, SocketCommand};
use super::protocol::{OutboundMessage, PermissionBehavior, PermissionResponse};

impl ConnectionManager {
    /// Send a message on the session's open stream.
    ///
    /// Returns false without touching the store when the stream is not open;
    /// nothing is queued for later. On success the store reflects the message
    /// immediately instead of waiting for the gateway's echo.
    pub fn send_to_session(&self, session_id: &str, message: OutboundMessage) -> bool {
        let Some(channel) = self.open_channel(session_id) else {
            log::debug!("Session {} is not connected, dropping {:?}", session_id, message);
            return false;
        };

        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to encode message for {}: {}", session_id, e);
                return false;
            }
        };

        if channel.send(SocketCommand::Send(payload)).is_err() {
            // Socket task already exited
            return false;
        }

        self.apply_optimistic(session_id, message);
        true
    }

    /// Answer a pending permission request.
    pub fn respond_permission(
        &self,
        session_id: &str,
        request_id: &str,
        behavior: PermissionBehavior,
        message: Option<String>,
    ) -> bool {
        let response = PermissionResponse {
            request_id: request_id.to_string(),
            behavior,
            updated_input: None,
            message,
        };
        self.send_to_session(session_id, OutboundMessage::PermissionResponse(response))
    }

    pub fn send_user_message(&self, session_id: &str, content: impl Into<String>) -> bool {
        self.send_to_session(session_id, OutboundMessage::user_text(content))
    }

    pub fn interrupt(&self, session_id: &str) -> bool {
        self.send_to_session(session_id, OutboundMessage::Interrupt)
    }

    pub fn set_model(&self, session_id: &str, model: impl Into<String>) -> bool {
        self.send_to_session(
            session_id,
            OutboundMessage::SetModel {
                model: model.into(),
            },
        )
    }

    pub fn set_permission_mode(&self, session_id: &str, mode: impl Into<String>) -> bool {
        self.send_to_session(session_id, OutboundMessage::SetPermissionMode { mode: mode.into() })
    }

    fn apply_optimistic(&self, session_id: &str, message: OutboundMessage) {
        let store = self.store();
        let mut store = store.lock();
        match message {
            OutboundMessage::UserMessage { content, .. } => {
                let id = format!("user-{}", Uuid::new_v4());
                store.append_message(session_id, ChatMessage::new(id, Role::User, content));
                store.set_run_status(session_id, Some(RunStatus::Running));
            }
            OutboundMessage::PermissionResponse(response) => {
                store.remove_permission(session_id, &response.request_id);
            }
            OutboundMessage::Interrupt
            | OutboundMessage::SetModel { .. }
            | OutboundMessage::SetPermissionMode { .. } => {}
        }
    }
}
