use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};

use crate::config::ModelConfig;
use crate::error::{Result, SwitchyardError};
use crate::types::*;

/// LLM client: remote chat completion with streaming.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;

    /// Send a chat request and wait for the whole assistant message.
    fn complete(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<ChatMessage>> {
        let config = config.clone();
        Box::pin(async move {
            let mut stream = self.chat_stream(&config, messages).await?;
            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                if let StreamDelta::TextDelta(chunk) = delta? {
                    text.push_str(&chunk);
                }
            }
            Ok(ChatMessage::assistant_text(text))
        })
    }
}

/// Human approval. Asks an out-of-band decision maker and returns the raw answer.
///
/// Implementations may block for an unbounded time; callers apply their own timeout.
pub trait ApprovalService: Send + Sync + 'static {
    fn ask(&self, request: &ApprovalRequest) -> BoxFuture<'_, Result<String>>;
}

/// Approval service that rejects every request. Used when a workflow has no gates.
pub struct DenyAll;

impl ApprovalService for DenyAll {
    fn ask(&self, _request: &ApprovalRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async {
            Err(SwitchyardError::ApprovalClosed(
                "no approval service configured".into(),
            ))
        })
    }
}
