use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{ChatMessage, StreamDelta};

use crate::node::AgentNode;
use crate::sink::EventSink;

impl AgentNode {
    /// Run the remote model over `input` and return a new assistant message
    /// authored by `node_id`.
    ///
    /// Streamed chunks are forwarded to `sink` as `PartialOutput` events in
    /// arrival order. There is no retry here; wrap the client for that.
    pub async fn invoke(
        &self,
        node_id: &str,
        input: ChatMessage,
        sink: &EventSink,
        timeout: Option<Duration>,
    ) -> Result<ChatMessage> {
        let call = self.call(node_id, input, sink);
        let text = match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SwitchyardError::NodeTimeout {
                    node_id: node_id.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })??,
            None => call.await?,
        };

        if text.trim().is_empty() {
            return Err(SwitchyardError::EmptyResponse {
                node_id: node_id.to_string(),
            });
        }
        Ok(ChatMessage::assistant_text(text).with_author(node_id))
    }

    async fn call(&self, node_id: &str, input: ChatMessage, sink: &EventSink) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !self.instructions.is_empty() {
            messages.push(ChatMessage::system(self.instructions.as_str()));
        }
        messages.push(input);

        if !self.streaming {
            let reply = self
                .client
                .complete(&self.model, messages)
                .await
                .map_err(|e| e.at_node(node_id))?;
            return Ok(reply.text());
        }

        let mut stream = self
            .client
            .chat_stream(&self.model, messages)
            .await
            .map_err(|e| e.at_node(node_id))?;

        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta.map_err(|e| e.at_node(node_id))? {
                StreamDelta::TextDelta(chunk) => {
                    sink.partial(node_id, &chunk);
                    text.push_str(&chunk);
                }
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    debug!(node_id, input_tokens, output_tokens, "Agent usage");
                }
                StreamDelta::Stop(reason) => {
                    debug!(node_id, ?reason, "Agent stream stopped");
                }
                StreamDelta::MessageId(_) => {}
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchyard_core::config::ModelConfig;
    use switchyard_core::types::{Role, WorkflowEvent};
    use switchyard_test_utils::ScriptedLlm;

    use super::*;

    #[tokio::test]
    async fn test_invoke_streams_partials_in_order() {
        let llm = Arc::new(ScriptedLlm::replying("Paris in spring"));
        let agent = AgentNode::new(llm.clone(), ModelConfig::new("m")).with_instructions("You plan trips.");
        let (sink, mut rx) = EventSink::channel(None, true);

        let reply = agent
            .invoke("planner", ChatMessage::user("Go to Paris"), &sink, None)
            .await
            .unwrap();
        drop(sink);

        assert_eq!(reply.text(), "Paris in spring");
        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.author(), Some("planner"));

        let mut streamed = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                WorkflowEvent::PartialOutput { node_id, text_delta } => {
                    assert_eq!(node_id, "planner");
                    streamed.push_str(&text_delta);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(streamed, "Paris in spring");

        let call = &llm.calls()[0];
        assert_eq!(call[0].role(), Role::System);
        assert_eq!(call[1].text(), "Go to Paris");
    }

    #[tokio::test]
    async fn test_invoke_non_streaming_emits_nothing() {
        let llm = Arc::new(ScriptedLlm::replying("done"));
        let agent = AgentNode::new(llm, ModelConfig::new("m")).with_streaming(false);
        let (sink, mut rx) = EventSink::channel(None, true);

        let reply = agent.invoke("a", ChatMessage::user("x"), &sink, None).await.unwrap();
        drop(sink);
        assert_eq!(reply.text(), "done");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_blank_reply_is_empty_response() {
        let llm = Arc::new(ScriptedLlm::replying("   "));
        let agent = AgentNode::new(llm, ModelConfig::new("m"));
        let (sink, _rx) = EventSink::channel(None, false);

        let err = agent.invoke("a", ChatMessage::user("x"), &sink, None).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::EmptyResponse { node_id } if node_id == "a"));
    }

    #[tokio::test]
    async fn test_transport_failure_names_node() {
        let llm = Arc::new(ScriptedLlm::failing("HTTP 401: bad key"));
        let agent = AgentNode::new(llm, ModelConfig::new("m"));
        let (sink, _rx) = EventSink::channel(None, false);

        let err = agent.invoke("writer", ChatMessage::user("x"), &sink, None).await.unwrap_err();
        match err {
            SwitchyardError::NodeFailed { node_id, reason } => {
                assert_eq!(node_id, "writer");
                assert!(reason.contains("401"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invoke_times_out() {
        let llm = Arc::new(ScriptedLlm::replying("late").with_delay(Duration::from_secs(5)));
        let agent = AgentNode::new(llm, ModelConfig::new("m"));
        let (sink, _rx) = EventSink::channel(None, false);

        let err = agent
            .invoke("slow", ChatMessage::user("x"), &sink, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::NodeTimeout { timeout_ms: 20, .. }));
    }
}
