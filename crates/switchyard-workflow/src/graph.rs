use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::types::ChatMessage;

use crate::edge::{Edge, EdgeMode};
use crate::executor::{RunOptions, WorkflowRun};
use crate::node::{Node, NodeKind};

/// An immutable, validated workflow graph. Cheap to clone and safe to run
/// many times, concurrently; all per-run state lives in the run.
#[derive(Debug, Clone)]
pub struct Workflow {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    start: String,
    order: Vec<String>,
    nodes: HashMap<String, Arc<Node>>,
    edges: Vec<Edge>,
    outputs: Vec<String>,
    arity: HashMap<String, usize>,
    reroute: HashMap<String, String>,
}

impl Workflow {
    /// Assembled by the builder after validation.
    pub(crate) fn from_parts(
        name: String,
        start: String,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        outputs: Vec<String>,
        arity: HashMap<String, usize>,
        reroute: HashMap<String, String>,
    ) -> Self {
        let order = nodes.iter().map(|n| n.id.clone()).collect();
        let nodes = nodes
            .into_iter()
            .map(|n| (n.id.clone(), Arc::new(n)))
            .collect();
        Self {
            inner: Arc::new(Inner {
                name,
                start,
                order,
                nodes,
                edges,
                outputs,
                arity,
                reroute,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start(&self) -> &str {
        &self.inner.start
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.inner.nodes.get(id).map(|n| n.as_ref())
    }

    pub(crate) fn node_arc(&self, id: &str) -> Option<Arc<Node>> {
        self.inner.nodes.get(id).cloned()
    }

    /// Nodes in registration order (start first).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .order
            .iter()
            .filter_map(|id| self.inner.nodes.get(id).map(|n| n.as_ref()))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.inner.edges
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.inner.edges.iter().filter(move |e| e.from == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.inner.edges.iter().filter(move |e| e.to == id)
    }

    /// Designated output node ids; empty means "terminal nodes".
    pub fn outputs(&self) -> &[String] {
        &self.inner.outputs
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.outgoing(id).next().is_none()
    }

    /// Resolved arity of an aggregate node.
    pub fn arity(&self, id: &str) -> Option<usize> {
        self.inner.arity.get(id).copied()
    }

    /// Agent a human gate reroutes to on rejection.
    pub fn reroute_target(&self, gate_id: &str) -> Option<&str> {
        self.inner.reroute.get(gate_id).map(String::as_str)
    }

    /// Number of fan-in edges feeding `id`.
    pub fn fan_in_degree(&self, id: &str) -> usize {
        self.incoming(id)
            .filter(|e| e.mode == EdgeMode::FanInMember)
            .count()
    }

    pub(crate) fn kind_of(&self, id: &str) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    /// Start a run for `input`. Must be called inside a tokio runtime.
    pub fn run(&self, input: ChatMessage, options: RunOptions) -> WorkflowRun {
        WorkflowRun::start(self.clone(), input, options)
    }
}
