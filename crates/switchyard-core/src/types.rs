use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a single workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "binary")]
    Binary { data: Vec<u8>, mime_type: String },

    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_approval_request")]
    ToolApprovalRequest {
        id: String,
        tool_name: String,
        input_summary: String,
    },
}

/// A chat turn passed between workflow nodes.
///
/// Messages are immutable once built: there are no setters, and every
/// `with_*` combinator consumes the value and returns a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    role: Role,
    content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            author: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(
            Role::Assistant,
            vec![ContentBlock::Text { text: text.into() }],
        )
    }

    /// Return a copy of this message attributed to `author` (usually a node id).
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Return a copy of this message with a binary part appended.
    pub fn with_binary(mut self, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.content.push(ContentBlock::Binary {
            data,
            mime_type: mime_type.into(),
        });
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Text parts in order, without joining.
    pub fn text_parts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// Message ID from the API.
    MessageId(String),
}

/// A decision a human gate is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub node_id: String,
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(node_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            prompt: prompt.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Event emitted while a workflow run progresses.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Run accepted its input and started scheduling.
    RunStarted { run_id: RunId },
    /// A node was dispatched.
    NodeStarted { node_id: String },
    /// Text streaming from an agent node.
    PartialOutput { node_id: String, text_delta: String },
    /// A node produced its message.
    NodeCompleted { node_id: String, message: ChatMessage },
    /// A node failed; propagation along its edges stops.
    NodeFailed { node_id: String, error: String },
    /// A human gate is waiting for a decision.
    ApprovalRequested {
        request_id: String,
        node_id: String,
        prompt: String,
    },
    /// A human gate received a decision.
    ApprovalResolved { request_id: String, approved: bool },
    /// An output-designated (or aggregating) node yielded a value.
    WorkflowOutput { node_id: String, value: ChatMessage },
    /// The run observed cancellation and stopped.
    Cancelled,
}

impl WorkflowEvent {
    /// Node the event belongs to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id }
            | Self::PartialOutput { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::ApprovalRequested { node_id, .. }
            | Self::WorkflowOutput { node_id, .. } => Some(node_id),
            Self::RunStarted { .. } | Self::ApprovalResolved { .. } | Self::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_only_text_parts() {
        let msg = ChatMessage::new(
            Role::User,
            vec![
                ContentBlock::Text {
                    text: "look at ".into(),
                },
                ContentBlock::Binary {
                    data: vec![0x89, 0x50],
                    mime_type: "image/png".into(),
                },
                ContentBlock::Text {
                    text: "this".into(),
                },
            ],
        );
        assert_eq!(msg.text(), "look at this");
        assert_eq!(msg.text_parts(), vec!["look at ", "this"]);
        assert_eq!(msg.content().len(), 3);
    }

    #[test]
    fn with_author_returns_new_message() {
        let original = ChatMessage::assistant_text("pong");
        let authored = original.clone().with_author("agent-a");
        assert_eq!(original.author(), None);
        assert_eq!(authored.author(), Some("agent-a"));
        assert_eq!(authored.role(), Role::Assistant);
    }

    #[test]
    fn content_block_serde_tags() {
        let block = ContentBlock::ToolApprovalRequest {
            id: "r1".into(),
            tool_name: "bash".into(),
            input_summary: "ls".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_approval_request");
        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn event_node_id() {
        let ev = WorkflowEvent::PartialOutput {
            node_id: "n".into(),
            text_delta: "x".into(),
        };
        assert_eq!(ev.node_id(), Some("n"));
        assert_eq!(WorkflowEvent::Cancelled.node_id(), None);
    }
}
