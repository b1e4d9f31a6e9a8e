//! Gateway JSON Protocol Types
//!
//! Serde types for the browser-side session stream exposed by the gateway at
//! `/ws/agent/browser/<session_id>`. Every frame is a JSON object carrying a
//! `type` discriminator.
//!
//! ## Protocol Overview
//!
//! Inbound frames (gateway → client):
//! - `session_init` / `session_update` / `session_name_update` describe the session
//! - `assistant`, `stream_event` and `user_message` carry conversation content
//! - `result` closes a turn with cost and usage accounting
//! - `permission_request` / `permission_cancelled` manage tool approvals
//! - `cli_connected` / `cli_disconnected` / `status_change` report the agent process
//! - `message_history` replays earlier frames after a (re)connect
//!
//! Outbound frames (client → gateway) are modelled by [`OutboundMessage`].
//!
//! ```rust,ignore
//! let frame: InboundFrame = serde_json::from_str(text)?;
//! match frame {
//!     InboundFrame::Assistant(msg) => { /* append to transcript */ }
//!     InboundFrame::Unknown => { /* newer gateway, skip */ }
//!     // ...
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::store::{PermissionRequest, SessionPatch, SessionState};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Inbound Frames
// ============================================================================

/// Top-level frames emitted by the gateway for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Full session descriptor, sent once the agent process has attached.
    SessionInit { session: SessionState },

    /// Partial session descriptor.
    SessionUpdate { session: SessionPatch },

    /// A complete assistant message.
    Assistant(AssistantFrame),

    /// Raw streaming event from the model API (partial tokens).
    StreamEvent(StreamEventFrame),

    /// Turn completed, successfully or not.
    Result(ResultFrame),

    /// The agent wants approval to run a tool.
    PermissionRequest(PermissionRequestFrame),

    /// A pending approval is no longer needed.
    PermissionCancelled { request_id: String },

    /// Agent process state change (`compacting`, `idle`, ...).
    StatusChange {
        #[serde(default)]
        status: Option<String>,
    },

    /// Application-level error reported by the gateway.
    Error { message: String },

    /// The agent process attached to the gateway.
    CliConnected,

    /// The agent process went away.
    CliDisconnected,

    /// Echo of a user turn, used when replaying history.
    UserMessage(UserMessageFrame),

    /// Batch of earlier frames, oldest first.
    MessageHistory {
        #[serde(default)]
        messages: Vec<Value>,
    },

    /// Server-assigned session title.
    SessionNameUpdate { name: String },

    /// Progress tick for a long-running tool.
    ToolProgress,

    /// Condensed summary of finished tool calls.
    ToolUseSummary,

    /// Catch-all for frame types added in newer gateway versions.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ============================================================================
// Payload Envelopes
// ============================================================================

/// `result` payload. Gateways send it either under `data` or inlined next to
/// the tag; both decode to the same frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ResultEnvelope")]
pub struct ResultFrame {
    pub data: ResultData,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultEnvelope {
    Nested { data: ResultData },
    Flat(ResultData),
}

impl From<ResultEnvelope> for ResultFrame {
    fn from(envelope: ResultEnvelope) -> Self {
        match envelope {
            ResultEnvelope::Nested { data } | ResultEnvelope::Flat(data) => Self { data },
        }
    }
}

/// `permission_request` payload, nested under `request` or inlined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PermissionRequestEnvelope")]
pub struct PermissionRequestFrame {
    pub request: PermissionRequest,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionRequestEnvelope {
    Nested { request: PermissionRequest },
    Flat(PermissionRequest),
}

impl From<PermissionRequestEnvelope> for PermissionRequestFrame {
    fn from(envelope: PermissionRequestEnvelope) -> Self {
        match envelope {
            PermissionRequestEnvelope::Nested { request }
            | PermissionRequestEnvelope::Flat(request) => Self { request },
        }
    }
}

// ============================================================================
// Assistant Frames
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantFrame {
    pub message: AssistantMessage,

    /// Set when the message comes from a subagent spawned by a tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Only present on replayed history entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// API message id (e.g. "msg_01...")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

impl AssistantMessage {
    /// Concatenation of every `text` block, in order.
    pub fn flat_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Content Blocks
// ============================================================================

/// Structured content inside assistant messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    Thinking(ThinkingBlock),
    ToolResult(ToolResultBlock),

    /// Unknown block types are kept as a marker rather than failing the message.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

// ============================================================================
// Stream Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEventFrame {
    pub event: StreamEvent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// Subset of the model API's streaming events that the client acts on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ContentBlockDelta {
        #[serde(default)]
        index: Option<u32>,
        delta: Delta,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Unknown,
}

// ============================================================================
// Result Frames
// ============================================================================

/// Turn completion payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultData {
    /// "success" or an error subtype such as "error_max_turns"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default)]
    pub is_error: bool,

    /// Final text of the turn; carries the error message when `is_error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines_added: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines_removed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,

    /// Per-model accounting, keyed by model id
    #[serde(default, rename = "modelUsage", skip_serializing_if = "HashMap::is_empty")]
    pub model_usage: HashMap<String, ModelUsage>,
}

impl ResultData {
    /// Text for the transcript when the turn failed.
    pub fn error_text(&self) -> String {
        if let Some(text) = self.result.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }
        if !self.errors.is_empty() {
            return self.errors.join(", ");
        }
        "An error occurred".to_string()
    }

    /// Highest context-window utilisation across models, as a percentage.
    pub fn context_used_percent(&self) -> Option<u8> {
        self.model_usage
            .values()
            .filter(|usage| usage.context_window > 0)
            .map(|usage| {
                let used = usage.input_tokens.saturating_add(usage.output_tokens) as f64;
                let pct = (used / usage.context_window as f64 * 100.0).round();
                pct.clamp(0.0, 100.0) as u8
            })
            .max()
    }
}

// ============================================================================
// Usage Information
// ============================================================================

/// Token usage information for an API call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default)]
    pub cache_read_input_tokens: u64,

    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Per-model accounting inside a result frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default)]
    pub cache_read_input_tokens: u64,

    #[serde(default)]
    pub cache_creation_input_tokens: u64,

    #[serde(default)]
    pub context_window: u64,

    #[serde(default, rename = "costUSD")]
    pub cost_usd: f64,
}

// ============================================================================
// User Echo
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessageFrame {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

// ============================================================================
// Outbound Messages
// ============================================================================

/// Frames the client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// A user-authored turn.
    UserMessage {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        images: Option<Vec<ImageAttachment>>,
    },

    /// Answer to a `permission_request`.
    PermissionResponse(PermissionResponse),

    /// Stop the current turn.
    Interrupt,

    SetModel { model: String },

    SetPermissionMode { mode: String },
}

impl OutboundMessage {
    pub fn user_text(content: impl Into<String>) -> Self {
        Self::UserMessage {
            content: content.into(),
            images: None,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Base64 image sent alongside a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionBehavior {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionResponse {
    pub request_id: String,
    pub behavior: PermissionBehavior,

    /// Edited tool input, when the user changed it before approving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,

    /// Reason shown to the agent on deny
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PermissionResponse {
    pub fn allow(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            behavior: PermissionBehavior::Allow,
            updated_input: None,
            message: None,
        }
    }

    pub fn deny(request_id: impl Into<String>, reason: &str) -> Self {
        Self {
            request_id: request_id.into(),
            behavior: PermissionBehavior::Deny,
            updated_input: None,
            message: Some(reason.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
