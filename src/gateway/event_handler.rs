//! Inbound frame dispatch.
//!
//! Each frame maps to exactly one batch of store mutations. Callers hold the
//! store lock for the whole call, so a frame is observed either not at all or
//! completely.

use std::collections::HashSet;
use uuid::Uuid;

use crate::store::{ChatMessage, Role, RunStatus, SessionPatch, SessionStore};

use super::protocol::{
    AssistantFrame, Delta, InboundFrame, PermissionRequestFrame, ProtocolError, ResultData,
    ResultFrame, StreamEvent, UserMessageFrame,
};

/// Parse `raw` and apply it to `session_id`.
pub fn handle_frame(
    store: &mut SessionStore,
    session_id: &str,
    raw: &str,
) -> Result<(), ProtocolError> {
    let frame = InboundFrame::parse(raw)?;
    apply_frame(store, session_id, frame);
    Ok(())
}

/// Apply one already-parsed frame.
pub fn apply_frame(store: &mut SessionStore, session_id: &str, frame: InboundFrame) {
    match frame {
        InboundFrame::SessionInit { mut session } => {
            if !store.has_session(session_id) {
                // Removed while its stream was still draining
                log::debug!("Ignoring session_init for removed session {}", session_id);
                return;
            }
            // The connection, not the payload, decides which session this is
            session.session_id = session_id.to_string();
            store.add_session(session);
            store.set_backend_connected(session_id, true);
            store.set_run_status(session_id, Some(RunStatus::Idle));
        }
        InboundFrame::SessionUpdate { session } => {
            store.update_session(session_id, session);
        }
        InboundFrame::Assistant(assistant) => {
            handle_assistant(store, session_id, assistant);
        }
        InboundFrame::StreamEvent(stream) => match stream.event {
            StreamEvent::MessageStart => {
                store.start_streaming(session_id);
                store.set_run_status(session_id, Some(RunStatus::Running));
            }
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => {
                store.append_streaming(session_id, &text);
            }
            StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => {}
        },
        InboundFrame::Result(ResultFrame { data }) => {
            handle_result(store, session_id, data);
        }
        InboundFrame::PermissionRequest(PermissionRequestFrame { request }) => {
            store.add_permission(session_id, request);
        }
        InboundFrame::PermissionCancelled { request_id } => {
            store.remove_permission(session_id, &request_id);
        }
        InboundFrame::StatusChange { status } => {
            let compacting = status.as_deref() == Some("compacting");
            let run_status = if compacting {
                RunStatus::Compacting
            } else {
                RunStatus::Idle
            };
            store.set_run_status(session_id, Some(run_status));
            store.update_session(
                session_id,
                SessionPatch {
                    is_compacting: Some(compacting),
                    ..Default::default()
                },
            );
        }
        InboundFrame::Error { message } => {
            store.append_message(session_id, ChatMessage::system(message));
        }
        InboundFrame::CliConnected => {
            store.set_backend_connected(session_id, true);
        }
        InboundFrame::CliDisconnected => {
            store.set_backend_connected(session_id, false);
            store.set_run_status(session_id, None);
        }
        InboundFrame::UserMessage(user) => {
            store.append_message(session_id, user_to_chat(user));
        }
        InboundFrame::MessageHistory { messages } => {
            let converted = history_to_chat_messages(messages);
            let current = store.messages(session_id).len();
            if converted.len() >= current {
                store.set_messages(session_id, converted);
            } else {
                log::debug!(
                    "Ignoring shorter history for {}: {} < {}",
                    session_id,
                    converted.len(),
                    current
                );
            }
        }
        InboundFrame::SessionNameUpdate { name } => {
            if store.display_name(session_id).is_none() {
                store.set_display_name(session_id, name);
            }
        }
        InboundFrame::ToolProgress | InboundFrame::ToolUseSummary => {
            // Rendered by the UI from its own tool tracking
        }
        InboundFrame::Unknown => {
            // Frame type from a newer gateway - skip gracefully
        }
    }
}

fn handle_assistant(store: &mut SessionStore, session_id: &str, assistant: AssistantFrame) {
    let mut message = assistant_to_chat(assistant);
    if store.messages(session_id).iter().any(|m| m.id == message.id) {
        // Multi-part responses reuse the API message id
        message.id = format!("{}-{}", message.id, Uuid::new_v4());
    }

    store.append_message(session_id, message);
    store.set_streaming(session_id, None);

    if store.current_session() != Some(session_id) {
        store.increment_unread(session_id, 1);
    }
}

fn handle_result(store: &mut SessionStore, session_id: &str, data: ResultData) {
    let patch = SessionPatch {
        total_cost_usd: data.total_cost_usd,
        num_turns: data.num_turns,
        total_lines_added: data.total_lines_added,
        total_lines_removed: data.total_lines_removed,
        context_used_percent: data.context_used_percent(),
        ..Default::default()
    };
    store.update_session(session_id, patch);
    store.set_streaming(session_id, None);
    store.set_run_status(session_id, Some(RunStatus::Idle));

    if data.is_error {
        store.append_message(session_id, ChatMessage::system(data.error_text()));
    }
}

fn assistant_to_chat(assistant: AssistantFrame) -> ChatMessage {
    let content = assistant.message.flat_text();
    let id = assistant
        .message
        .id
        .clone()
        .unwrap_or_else(|| format!("assistant-{}", Uuid::new_v4()));

    let mut message = ChatMessage::new(id, Role::Assistant, content);
    if let Some(ts) = assistant.timestamp {
        message.timestamp = ts;
    }
    message.parent_tool_use_id = assistant.parent_tool_use_id;
    message.model = assistant.message.model;
    message.stop_reason = assistant.message.stop_reason;
    message.content_blocks = Some(assistant.message.content);
    message
}

fn user_to_chat(user: UserMessageFrame) -> ChatMessage {
    let id = user
        .id
        .unwrap_or_else(|| format!("user-{}", Uuid::new_v4()));
    let message = ChatMessage::new(id, Role::User, user.content);
    match user.timestamp {
        Some(ts) => message.with_timestamp(ts),
        None => message,
    }
}

/// Convert replayed frames into transcript entries, oldest first. Entries
/// that fail to parse or carry nothing for the transcript are skipped.
pub fn history_to_chat_messages(entries: Vec<serde_json::Value>) -> Vec<ChatMessage> {
    let mut seen_ids = HashSet::new();
    let mut messages = Vec::with_capacity(entries.len());

    for entry in entries {
        let frame: InboundFrame = match serde_json::from_value(entry) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Skipping unparseable history entry: {}", e);
                continue;
            }
        };

        let message = match frame {
            InboundFrame::Assistant(assistant) => assistant_to_chat(assistant),
            InboundFrame::Result(ResultFrame { data }) if data.is_error => {
                ChatMessage::system(data.error_text())
            }
            InboundFrame::UserMessage(user) => user_to_chat(user),
            _ => continue,
        };

        let message = if seen_ids.contains(&message.id) {
            ChatMessage {
                id: format!("{}-{}", message.id, Uuid::new_v4()),
                ..message
            }
        } else {
            message
        };
        seen_ids.insert(message.id.clone());
        messages.push(message);
    }

    messages
}
