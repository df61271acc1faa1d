use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream the text word by word, then stop.
    Text(String),
    /// Fail the call with an `LlmRequest` error.
    Fail(String),
}

/// An [`LlmClient`] that plays back queued replies and records every call.
///
/// Replies are consumed in order. Once the queue is empty the fallback reply
/// (if any) is repeated; otherwise the call fails.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    delay: Duration,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        let mut llm = Self::new();
        llm.fallback = Some(Reply::Text(text.into()));
        llm
    }

    /// Always fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let mut llm = Self::new();
        llm.fallback = Some(Reply::Fail(reason.into()));
        llm
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.push(Reply::Text(text.into()))
    }

    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        self.push(Reply::Fail(reason.into()))
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Conversations received, one entry per call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// Last non-system message of the most recent call.
    pub fn last_input(&self) -> Option<ChatMessage> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|conv| conv.iter().rev().find(|m| m.role() != Role::System).cloned())
    }

    fn next_reply(&self) -> Option<Reply> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(messages);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.next_reply() {
                Some(Reply::Text(text)) => {
                    let mut deltas: Vec<Result<StreamDelta>> = text
                        .split_inclusive(' ')
                        .map(|w| Ok(StreamDelta::TextDelta(w.to_string())))
                        .collect();
                    deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
                    Ok(Box::pin(futures::stream::iter(deltas)) as BoxStream<'_, _>)
                }
                Some(Reply::Fail(reason)) => Err(SwitchyardError::LlmRequest(reason)),
                None => Err(SwitchyardError::LlmRequest("script exhausted".into())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_queue_then_fallback() {
        let llm = ScriptedLlm::replying("again").then_reply("first reply");
        let config = ModelConfig::new("test");

        let a = llm.complete(&config, vec![ChatMessage::user("1")]).await.unwrap();
        let b = llm.complete(&config, vec![ChatMessage::user("2")]).await.unwrap();
        assert_eq!(a.text(), "first reply");
        assert_eq!(b.text(), "again");
        assert_eq!(llm.call_count(), 2);
        assert_eq!(llm.last_input().unwrap().text(), "2");
    }

    #[tokio::test]
    async fn exhausted_script_fails() {
        let llm = ScriptedLlm::new().then_fail("HTTP 500: boom");
        let config = ModelConfig::new("test");
        assert!(llm.complete(&config, vec![]).await.is_err());
        assert!(llm.complete(&config, vec![]).await.is_err());
    }
}
