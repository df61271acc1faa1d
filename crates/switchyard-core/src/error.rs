use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Node errors
    #[error("Remote call failed: {0}")]
    RemoteCallFailed(String),

    #[error("Node {node_id} failed: {reason}")]
    NodeFailed { node_id: String, reason: String },

    #[error("Node {node_id} returned an empty response")]
    EmptyResponse { node_id: String },

    #[error("Node {node_id} timed out after {timeout_ms}ms")]
    NodeTimeout { node_id: String, timeout_ms: u64 },

    // Run errors
    #[error("Run incomplete: output nodes never fired (waiting on {waiting:?}, failed {failed:?})")]
    RunIncomplete {
        waiting: Vec<String>,
        failed: Vec<(String, String)>,
    },

    #[error("Run exceeded max duration ({0}ms)")]
    RunTimeout(u64),

    #[error("Run task aborted: {0}")]
    RunAborted(String),

    #[error("Run cancelled")]
    Cancelled,

    // Approval errors
    #[error("Approval timeout at gate: {node_id}")]
    ApprovalTimeout { node_id: String },

    #[error("Gate {node_id} not approved after {rounds} rounds")]
    ApprovalRoundsExceeded { node_id: String, rounds: usize },

    #[error("Approval channel closed: {0}")]
    ApprovalClosed(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Attach a node id to a remote-call failure so the caller sees which branch failed.
    pub fn at_node(self, node_id: &str) -> Self {
        match self {
            SwitchyardError::RemoteCallFailed(reason)
            | SwitchyardError::LlmRequest(reason)
            | SwitchyardError::LlmStream(reason) => SwitchyardError::NodeFailed {
                node_id: node_id.to_string(),
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
