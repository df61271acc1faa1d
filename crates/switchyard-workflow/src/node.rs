use std::fmt;
use std::sync::Arc;

use switchyard_core::config::ModelConfig;
use switchyard_core::traits::LlmClient;

/// A unit of work in a workflow graph. Identity is the id.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

/// Closed set of node kinds; the scheduler dispatches on this directly.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Delegates to a remote chat model.
    Agent(AgentNode),
    /// Sends a copy of its input along every outgoing edge.
    Broadcast,
    /// Joins one message per fan-in source. `None` lets the builder infer the arity.
    Aggregate { expected: Option<usize> },
    /// Suspends for an out-of-band decision before letting a message through.
    HumanGate(GateSpec),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Agent(_) => "agent",
            NodeKind::Broadcast => "broadcast",
            NodeKind::Aggregate { .. } => "aggregate",
            NodeKind::HumanGate(_) => "human_gate",
        }
    }
}

impl Node {
    pub fn agent(id: impl Into<String>, agent: AgentNode) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Agent(agent),
        }
    }

    pub fn broadcast(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Broadcast,
        }
    }

    /// Aggregate whose arity is set by the fan-in edge feeding it.
    pub fn aggregate(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Aggregate { expected: None },
        }
    }

    /// Aggregate with a fixed arity; fan-in edges must match it.
    pub fn aggregate_of(id: impl Into<String>, expected: usize) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Aggregate {
                expected: Some(expected),
            },
        }
    }

    pub fn human_gate(id: impl Into<String>, gate: GateSpec) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::HumanGate(gate),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, NodeKind::Aggregate { .. })
    }

    pub fn as_agent(&self) -> Option<&AgentNode> {
        match &self.kind {
            NodeKind::Agent(agent) => Some(agent),
            _ => None,
        }
    }
}

/// Remote-call configuration of an agent node.
///
/// The client is passed in explicitly so several nodes can share one
/// connection pool, and tests can substitute a scripted client.
#[derive(Clone)]
pub struct AgentNode {
    pub instructions: String,
    pub model: ModelConfig,
    pub client: Arc<dyn LlmClient>,
    /// Stream deltas as they arrive instead of waiting for the whole reply.
    pub streaming: bool,
}

impl AgentNode {
    pub fn new(client: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self {
            instructions: String::new(),
            model,
            client,
            streaming: true,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

impl fmt::Debug for AgentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentNode")
            .field("instructions", &self.instructions)
            .field("model", &self.model.model_id)
            .field("streaming", &self.streaming)
            .finish()
    }
}

/// Human-approval gate settings.
#[derive(Debug, Clone)]
pub struct GateSpec {
    /// Question put to the approver.
    pub prompt: String,
    /// Answer (case-insensitive, surrounding whitespace ignored) that approves.
    pub approve_token: String,
    /// Agent re-invoked on rejection. Defaults to the gate's single upstream agent.
    pub reroute_to: Option<String>,
}

impl GateSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            approve_token: "yes".to_string(),
            reroute_to: None,
        }
    }

    pub fn with_approve_token(mut self, token: impl Into<String>) -> Self {
        self.approve_token = token.into();
        self
    }

    pub fn with_reroute_to(mut self, node_id: impl Into<String>) -> Self {
        self.reroute_to = Some(node_id.into());
        self
    }

    pub fn is_approval(&self, answer: &str) -> bool {
        answer.trim().eq_ignore_ascii_case(self.approve_token.trim())
    }

    /// Text shown to the approver for one candidate.
    pub fn render_prompt(&self, candidate: &str) -> String {
        if candidate.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\n\n{}", candidate, self.prompt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_approval_is_case_insensitive() {
        let gate = GateSpec::new("Boss, can you confirm this?");
        assert!(gate.is_approval("Yes"));
        assert!(gate.is_approval("  YES\n"));
        assert!(!gate.is_approval("yes please"));
        assert!(!gate.is_approval("no"));

        let custom = GateSpec::new("ok?").with_approve_token("ship it");
        assert!(custom.is_approval("Ship It"));
    }

    #[test]
    fn test_gate_prompt_includes_candidate() {
        let gate = GateSpec::new("Confirm?");
        assert_eq!(gate.render_prompt("Hire Ada"), "Hire Ada\n\nConfirm?");
        assert_eq!(gate.render_prompt(""), "Confirm?");
    }

    #[test]
    fn test_node_kind_labels() {
        assert_eq!(Node::broadcast("s").kind.label(), "broadcast");
        assert_eq!(Node::aggregate("j").kind.label(), "aggregate");
        assert!(Node::aggregate_of("j", 2).is_aggregate());
        assert!(Node::broadcast("s").as_agent().is_none());
    }
}
