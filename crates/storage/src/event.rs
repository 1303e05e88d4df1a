//! Event types for the thread history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a remote conversation thread.
///
/// Thread ids are minted by the remote assistant service, so they are opaque
/// strings rather than UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// The kind of event that occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A message was added to the conversation.
    Message { role: Role, content: String },
    /// The remote run asked for a tool.
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The output submitted back for a tool call.
    ToolResult {
        call_id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    /// A run reached a terminal state, or the local loop gave up on it.
    RunEnd {
        run_id: Option<String>,
        status: String,
        detail: Option<String>,
    },
}

impl EventKind {
    /// Stable name stored in the `kind` column.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::RunEnd { .. } => "run_end",
        }
    }
}

/// An event in the thread log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub thread_id: ThreadId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(thread_id: ThreadId, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn message(thread_id: ThreadId, role: Role, content: impl Into<String>) -> Self {
        Self::new(
            thread_id,
            EventKind::Message {
                role,
                content: content.into(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_with_tag() {
        let kind = EventKind::ToolCall {
            call_id: "call_1".into(),
            name: "fetch_current_temperature".into(),
            arguments: String::new(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(kind.name(), "tool_call");
    }

    #[test]
    fn thread_id_is_transparent() {
        let id = ThreadId::from("thread_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"thread_abc\"");
        assert_eq!(id.to_string(), "thread_abc");
    }
}
