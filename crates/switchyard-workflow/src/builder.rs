use std::collections::{HashMap, HashSet};

use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};

use crate::edge::{Edge, EdgeMode};
use crate::graph::Workflow;
use crate::node::{Node, NodeKind};

/// Incrementally assembles a [`Workflow`].
///
/// Every `add_*` call validates its arguments first and leaves the builder
/// untouched when it returns an error. [`build`](Self::build) only reads the
/// builder, so it can be called repeatedly.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    start: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outputs: Vec<String>,
}

fn config_err(msg: impl Into<String>) -> SwitchyardError {
    SwitchyardError::Config(msg.into())
}

impl WorkflowBuilder {
    pub fn new(start: Node) -> Self {
        Self {
            name: "workflow".to_string(),
            start: start.id.clone(),
            nodes: vec![start],
            edges: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn require(&self, id: &str) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| config_err(format!("unknown node '{}'", id)))
    }

    fn fan_in_sources<'a>(&'a self, to: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.to == to && e.mode == EdgeMode::FanInMember)
            .map(|e| e.from.as_str())
    }

    /// Register a node. Ids must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<&mut Self> {
        if self.node(&node.id).is_some() {
            return Err(config_err(format!("duplicate node id '{}'", node.id)));
        }
        self.nodes.push(node);
        Ok(self)
    }

    /// Plain 1:1 edge.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        self.require(from)?;
        if self.require(to)?.is_aggregate() {
            return Err(config_err(format!(
                "aggregate '{}' only accepts fan-in edges",
                to
            )));
        }
        self.edges.push(Edge::direct(from, to));
        Ok(self)
    }

    /// One edge per target, all sharing `from`.
    pub fn add_fan_out_edge<I, S>(&mut self, from: &str, targets: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        self.require(from)?;
        if targets.is_empty() {
            return Err(config_err(format!("fan-out from '{}' has no targets", from)));
        }
        let mut seen = HashSet::new();
        for target in &targets {
            if self.require(target)?.is_aggregate() {
                return Err(config_err(format!(
                    "aggregate '{}' only accepts fan-in edges",
                    target
                )));
            }
            if !seen.insert(target.as_str()) {
                return Err(config_err(format!(
                    "fan-out from '{}' lists '{}' twice",
                    from, target
                )));
            }
        }

        self.edges
            .extend(targets.into_iter().map(|to| Edge::fan_out(from, to)));
        Ok(self)
    }

    /// One edge per source into the aggregate `to`.
    pub fn add_fan_in_edge<I, S>(&mut self, sources: I, to: &str) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        let expected = match &self.require(to)?.kind {
            NodeKind::Aggregate { expected } => *expected,
            other => {
                return Err(config_err(format!(
                    "fan-in target '{}' is a {} node, not an aggregate",
                    to,
                    other.label()
                )))
            }
        };
        if sources.is_empty() {
            return Err(config_err(format!("fan-in into '{}' has no sources", to)));
        }

        let existing: HashSet<&str> = self.fan_in_sources(to).collect();
        let mut seen = HashSet::new();
        for source in &sources {
            self.require(source)?;
            if existing.contains(source.as_str()) || !seen.insert(source.as_str()) {
                return Err(config_err(format!(
                    "'{}' already feeds aggregate '{}'",
                    source, to
                )));
            }
        }

        let total = existing.len() + sources.len();
        if let Some(n) = expected {
            if total > n {
                return Err(config_err(format!(
                    "aggregate '{}' expects {} inputs, got {}",
                    to, n, total
                )));
            }
        }

        self.edges
            .extend(sources.into_iter().map(|from| Edge::fan_in(from, to)));
        Ok(self)
    }

    /// Designate nodes whose values become the run output.
    pub fn with_output_from<I, S>(&mut self, ids: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        for id in &ids {
            self.require(id)?;
        }
        for id in ids {
            if !self.outputs.contains(&id) {
                self.outputs.push(id);
            }
        }
        Ok(self)
    }

    /// Validate the accumulated graph and freeze it.
    pub fn build(&self) -> Result<Workflow> {
        for edge in &self.edges {
            self.require(&edge.from)?;
            self.require(&edge.to)?;
        }
        for id in &self.outputs {
            self.require(id)?;
        }

        let start = self.require(&self.start)?;
        if start.is_aggregate() {
            return Err(config_err(format!(
                "start node '{}' cannot be an aggregate",
                start.id
            )));
        }

        let mut arity = HashMap::new();
        let mut reroute = HashMap::new();

        for node in &self.nodes {
            match &node.kind {
                NodeKind::Aggregate { expected } => {
                    let fed = self.fan_in_sources(&node.id).count();
                    if fed == 0 {
                        return Err(config_err(format!(
                            "aggregate '{}' has no fan-in edges",
                            node.id
                        )));
                    }
                    if let Some(n) = expected {
                        if *n != fed {
                            return Err(config_err(format!(
                                "aggregate '{}' expects {} inputs but {} edges feed it",
                                node.id, n, fed
                            )));
                        }
                    }
                    arity.insert(node.id.clone(), fed);
                }
                NodeKind::HumanGate(spec) => {
                    let target = self.resolve_reroute(&node.id, spec.reroute_to.as_deref())?;
                    reroute.insert(node.id.clone(), target);
                }
                NodeKind::Agent(_) | NodeKind::Broadcast => {}
            }
        }

        debug!(
            workflow = %self.name,
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "Workflow built"
        );

        Ok(Workflow::from_parts(
            self.name.clone(),
            self.start.clone(),
            self.nodes.clone(),
            self.edges.clone(),
            self.outputs.clone(),
            arity,
            reroute,
        ))
    }

    fn resolve_reroute(&self, gate_id: &str, explicit: Option<&str>) -> Result<String> {
        let target = match explicit {
            Some(id) => id.to_string(),
            None => {
                let upstream: Vec<&str> = self
                    .edges
                    .iter()
                    .filter(|e| e.to == gate_id)
                    .map(|e| e.from.as_str())
                    .collect();
                match upstream.as_slice() {
                    [single] => single.to_string(),
                    _ => {
                        return Err(config_err(format!(
                            "human gate '{}' needs exactly one upstream agent or an explicit reroute target",
                            gate_id
                        )))
                    }
                }
            }
        };

        match self.require(&target)?.kind {
            NodeKind::Agent(_) => Ok(target),
            ref other => Err(config_err(format!(
                "human gate '{}' reroutes to '{}', a {} node; expected an agent",
                gate_id,
                target,
                other.label()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchyard_core::config::ModelConfig;
    use switchyard_test_utils::ScriptedLlm;

    use super::*;
    use crate::node::{AgentNode, GateSpec};

    fn agent(id: &str) -> Node {
        Node::agent(
            id,
            AgentNode::new(Arc::new(ScriptedLlm::replying(id)), ModelConfig::new("m")),
        )
    }

    #[test]
    fn test_unknown_endpoint_rejected_without_mutation() {
        let mut b = WorkflowBuilder::new(agent("a"));
        b.add_node(agent("b")).unwrap();
        b.add_edge("a", "b").unwrap();

        assert!(matches!(b.add_edge("a", "ghost"), Err(SwitchyardError::Config(_))));
        assert!(b.add_fan_out_edge("a", ["b", "ghost"]).is_err());
        assert_eq!(b.edges().len(), 1);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut b = WorkflowBuilder::new(agent("a"));
        assert!(b.add_node(agent("a")).is_err());
    }

    #[test]
    fn test_fan_in_infers_arity() {
        let mut b = WorkflowBuilder::new(Node::broadcast("start"));
        b.add_node(agent("x"))
            .unwrap()
            .add_node(agent("y"))
            .unwrap()
            .add_node(Node::aggregate("join"))
            .unwrap();
        b.add_fan_out_edge("start", ["x", "y"])
            .unwrap()
            .add_fan_in_edge(["x", "y"], "join")
            .unwrap();

        let wf = b.build().unwrap();
        assert_eq!(wf.arity("join"), Some(2));
        assert_eq!(wf.fan_in_degree("join"), 2);
    }

    #[test]
    fn test_fan_in_arity_mismatch() {
        let mut b = WorkflowBuilder::new(Node::broadcast("start"));
        b.add_node(agent("x")).unwrap();
        b.add_node(agent("y")).unwrap();
        b.add_node(agent("z")).unwrap();
        b.add_node(Node::aggregate_of("join", 2)).unwrap();

        assert!(b.add_fan_in_edge(["x", "y", "z"], "join").is_err());
        assert!(b.edges().is_empty());

        // under-fed aggregate only fails at build time
        b.add_fan_in_edge(["x"], "join").unwrap();
        let edges_before = b.edges().to_vec();
        assert!(matches!(b.build(), Err(SwitchyardError::Config(_))));
        assert_eq!(b.edges(), edges_before.as_slice());
    }

    #[test]
    fn test_fan_in_requires_aggregate_target() {
        let mut b = WorkflowBuilder::new(agent("a"));
        b.add_node(agent("b")).unwrap();
        assert!(b.add_fan_in_edge(["a"], "b").is_err());
        b.add_node(Node::aggregate("join")).unwrap();
        assert!(b.add_edge("a", "join").is_err());
    }

    #[test]
    fn test_gate_needs_agent_upstream() {
        let mut b = WorkflowBuilder::new(Node::broadcast("start"));
        b.add_node(Node::human_gate("boss", GateSpec::new("ok?"))).unwrap();
        b.add_edge("start", "boss").unwrap();
        assert!(b.build().is_err());

        let mut b = WorkflowBuilder::new(agent("manager"));
        b.add_node(Node::human_gate("boss", GateSpec::new("ok?"))).unwrap();
        b.add_edge("manager", "boss").unwrap();
        assert_eq!(b.build().unwrap().reroute_target("boss"), Some("manager"));
    }

    #[test]
    fn test_build_is_repeatable() {
        let mut b = WorkflowBuilder::new(agent("a"));
        b.add_node(agent("b")).unwrap();
        b.add_edge("a", "b").unwrap();
        b.with_output_from(["b"]).unwrap();

        let first = b.build().unwrap();
        let second = b.build().unwrap();
        assert_eq!(first.edges(), second.edges());
        assert_eq!(first.outputs(), &["b".to_string()]);
        assert!(b.with_output_from(["nope"]).is_err());
    }
}
