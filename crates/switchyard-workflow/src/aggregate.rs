use std::collections::BTreeMap;

use tracing::debug;

use switchyard_core::types::{ChatMessage, ContentBlock, Role};

/// Per-run accumulation buffer of one aggregate node.
///
/// Inputs are keyed by source node id, so the joined message is the same
/// whatever order the branches finish in: one labeled text part per source,
/// sorted by source id, followed by that source's non-text parts (images,
/// tool calls) unchanged. A second delivery from the same source replaces the
/// first. The buffer empties itself each time it fires.
#[derive(Debug)]
pub struct FanInBuffer {
    node_id: String,
    expected: usize,
    received: BTreeMap<String, ChatMessage>,
}

impl FanInBuffer {
    pub fn new(node_id: impl Into<String>, expected: usize) -> Self {
        Self {
            node_id: node_id.into(),
            expected,
            received: BTreeMap::new(),
        }
    }

    /// Record one input. Returns the joined message once the arity is reached.
    pub fn deliver(&mut self, source: &str, message: ChatMessage) -> Option<ChatMessage> {
        if self.received.insert(source.to_string(), message).is_some() {
            debug!(node_id = %self.node_id, source, "Replacing earlier fan-in input");
        }
        if self.received.len() < self.expected {
            debug!(
                node_id = %self.node_id,
                received = self.received.len(),
                expected = self.expected,
                "Fan-in waiting"
            );
            return None;
        }

        let received = std::mem::take(&mut self.received);
        Some(join(&self.node_id, received))
    }

    /// True while some but not all inputs have arrived.
    pub fn is_waiting(&self) -> bool {
        !self.received.is_empty()
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }
}

fn join(node_id: &str, received: BTreeMap<String, ChatMessage>) -> ChatMessage {
    let mut parts = Vec::new();
    for (source, message) in received {
        parts.push(ContentBlock::Text {
            text: format!("{}: {}", source, message.text()),
        });
        parts.extend(
            message
                .content()
                .iter()
                .filter(|block| !matches!(block, ContentBlock::Text { .. }))
                .cloned(),
        );
    }
    ChatMessage::new(Role::Assistant, parts).with_author(node_id)
}
