//! Session-scoped records held by the store.
//!
//! These types double as wire types: the gateway sends `SessionState`,
//! `SessionPatch` and `PermissionRequest` verbatim inside protocol frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::protocol::ContentBlock;

/// Transport-level connectivity of a session's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// What the remote agent is doing. An absent run status means no backend
/// is attached, which is distinct from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Compacting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn in a conversation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_blocks: Option<Vec<ContentBlock>>,
    pub timestamp: i64, // epoch millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            content_blocks: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            parent_tool_use_id: None,
            model: None,
            stop_reason: None,
        }
    }

    /// A system-role message carrying an error surfaced by the remote agent.
    pub fn system(content: impl Into<String>) -> Self {
        let id = format!("error-{}", uuid::Uuid::new_v4());
        Self::new(id, Role::System, content)
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// An outstanding approval request raised by the remote agent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PermissionRequest {
    pub request_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_suggestions: Option<Vec<Value>>,
    #[serde(default)]
    pub timestamp: i64,
}

/// Descriptive record of a session as reported by the gateway.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, rename = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub claude_code_version: Option<String>,
    #[serde(default)]
    pub mcp_servers: Vec<Value>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub slash_commands: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub context_used_percent: u8,
    #[serde(default)]
    pub is_compacting: bool,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub is_worktree: bool,
    #[serde(default)]
    pub repo_root: Option<String>,
    #[serde(default)]
    pub git_ahead: u32,
    #[serde(default)]
    pub git_behind: u32,
    #[serde(default)]
    pub total_lines_added: u64,
    #[serde(default)]
    pub total_lines_removed: u64,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Partial session record. Only the fields that are set get merged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(
        default,
        rename = "permissionMode",
        skip_serializing_if = "Option::is_none"
    )]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_code_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slash_commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_compacting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_worktree: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_behind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines_added: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines_removed: Option<u64>,
}

impl SessionPatch {
    /// Shallow merge: every field set on the patch overwrites the record.
    pub fn apply_to(self, state: &mut SessionState) {
        fn merge<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn merge_opt<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        merge_opt(&mut state.model, self.model);
        merge_opt(&mut state.cwd, self.cwd);
        merge(&mut state.tools, self.tools);
        merge_opt(&mut state.permission_mode, self.permission_mode);
        merge_opt(&mut state.claude_code_version, self.claude_code_version);
        merge(&mut state.mcp_servers, self.mcp_servers);
        merge(&mut state.agents, self.agents);
        merge(&mut state.slash_commands, self.slash_commands);
        merge(&mut state.skills, self.skills);
        merge(&mut state.total_cost_usd, self.total_cost_usd);
        merge(&mut state.num_turns, self.num_turns);
        merge(&mut state.context_used_percent, self.context_used_percent);
        merge(&mut state.is_compacting, self.is_compacting);
        merge_opt(&mut state.git_branch, self.git_branch);
        merge(&mut state.is_worktree, self.is_worktree);
        merge_opt(&mut state.repo_root, self.repo_root);
        merge(&mut state.git_ahead, self.git_ahead);
        merge(&mut state.git_behind, self.git_behind);
        merge(&mut state.total_lines_added, self.total_lines_added);
        merge(&mut state.total_lines_removed, self.total_lines_removed);
    }
}
