//! Diagram projections of a [`Workflow`]: Mermaid flowcharts and Graphviz DOT.
//!
//! | Node kind  | Mermaid            | DOT            |
//! |------------|--------------------|----------------|
//! | Agent      | `id[label]`        | box            |
//! | Broadcast  | `id[/label\]`      | trapezium      |
//! | Aggregate  | `id[\label/]`      | invtrapezium   |
//! | HumanGate  | `id{label}`        | diamond        |
//!
//! Fan-in edges are dotted/dashed; the start node gets an entry marker and
//! designated outputs are highlighted.

use std::fmt::Write;

use crate::edge::EdgeMode;
use crate::graph::Workflow;
use crate::node::NodeKind;

/// Mermaid node ids must be alphanumeric plus underscores.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn mermaid_node(id: &str, kind: &NodeKind) -> String {
    let safe = sanitize_id(id);
    match kind {
        NodeKind::Agent(_) => format!("{}[\"{}\"]", safe, id),
        NodeKind::Broadcast => format!("{}[/\"{}\"\\]", safe, id),
        NodeKind::Aggregate { .. } => format!("{}[\\\"{}\"/]", safe, id),
        NodeKind::HumanGate(_) => format!("{}{{\"{}\"}}", safe, id),
    }
}

fn dot_shape(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Agent(_) => "box",
        NodeKind::Broadcast => "trapezium",
        NodeKind::Aggregate { .. } => "invtrapezium",
        NodeKind::HumanGate(_) => "diamond",
    }
}

fn dot_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Workflow {
    /// Render as a Mermaid `flowchart TD`.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");

        let _ = writeln!(out, "    __start__([start])");
        for node in self.nodes() {
            let _ = writeln!(out, "    {}", mermaid_node(&node.id, &node.kind));
        }

        let _ = writeln!(out, "    __start__ --> {}", sanitize_id(self.start()));
        for edge in self.edges() {
            let arrow = match edge.mode {
                EdgeMode::FanInMember => "-.->",
                EdgeMode::Direct | EdgeMode::FanOutMember => "-->",
            };
            let _ = writeln!(
                out,
                "    {} {} {}",
                sanitize_id(&edge.from),
                arrow,
                sanitize_id(&edge.to)
            );
        }

        if !self.outputs().is_empty() {
            let _ = writeln!(out, "    classDef output stroke-width:3px");
            let ids: Vec<String> = self.outputs().iter().map(|id| sanitize_id(id)).collect();
            let _ = writeln!(out, "    class {} output", ids.join(","));
        }
        out
    }

    /// Render as a Graphviz `digraph`.
    pub fn to_dot(&self) -> String {
        let mut out = format!("digraph {} {{\n", dot_quote(self.name()));
        let _ = writeln!(out, "    rankdir=TD;");

        for node in self.nodes() {
            let mut attrs = format!("shape={}", dot_shape(&node.kind));
            if node.id == self.start() {
                attrs.push_str(", style=bold");
            }
            if self.outputs().contains(&node.id) {
                attrs.push_str(", peripheries=2");
            }
            let _ = writeln!(out, "    {} [{}];", dot_quote(&node.id), attrs);
        }

        for edge in self.edges() {
            let style = match edge.mode {
                EdgeMode::FanInMember => " [style=dashed]",
                EdgeMode::Direct | EdgeMode::FanOutMember => "",
            };
            let _ = writeln!(
                out,
                "    {} -> {}{};",
                dot_quote(&edge.from),
                dot_quote(&edge.to),
                style
            );
        }

        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchyard_core::config::ModelConfig;
    use switchyard_test_utils::ScriptedLlm;

    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::node::{AgentNode, GateSpec, Node};

    fn agent(id: &str) -> Node {
        Node::agent(
            id,
            AgentNode::new(Arc::new(ScriptedLlm::replying("x")), ModelConfig::new("m")),
        )
    }

    fn concurrent() -> Workflow {
        let mut b = WorkflowBuilder::new(Node::broadcast("start")).with_name("concurrent");
        b.add_node(agent("travel-researcher")).unwrap();
        b.add_node(agent("planner")).unwrap();
        b.add_node(Node::aggregate("join")).unwrap();
        b.add_fan_out_edge("start", ["travel-researcher", "planner"]).unwrap();
        b.add_fan_in_edge(["travel-researcher", "planner"], "join").unwrap();
        b.with_output_from(["join"]).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("simple"), "simple");
        assert_eq!(sanitize_id("with-dash"), "with_dash");
        assert_eq!(sanitize_id("a.b c"), "a_b_c");
    }

    #[test]
    fn test_mermaid_shapes_and_edges() {
        let m = concurrent().to_mermaid();
        assert!(m.starts_with("flowchart TD\n"));
        assert!(m.contains("    start[/\"start\"\\]"));
        assert!(m.contains("    join[\\\"join\"/]"));
        assert!(m.contains("    travel_researcher[\"travel-researcher\"]"));
        assert!(m.contains("    __start__ --> start"));
        assert!(m.contains("    start --> planner"));
        assert!(m.contains("    planner -.-> join"));
        assert!(m.contains("    class join output"));
    }

    #[test]
    fn test_mermaid_gate_is_diamond() {
        let mut b = WorkflowBuilder::new(agent("manager"));
        b.add_node(Node::human_gate("boss", GateSpec::new("ok?"))).unwrap();
        b.add_edge("manager", "boss").unwrap();
        let m = b.build().unwrap().to_mermaid();
        assert!(m.contains("    boss{\"boss\"}"));
        assert!(!m.contains("classDef"));
    }

    #[test]
    fn test_dot_output() {
        let d = concurrent().to_dot();
        assert!(d.starts_with("digraph \"concurrent\" {\n"));
        assert!(d.contains("    \"start\" [shape=trapezium, style=bold];"));
        assert!(d.contains("    \"join\" [shape=invtrapezium, peripheries=2];"));
        assert!(d.contains("    \"start\" -> \"planner\";"));
        assert!(d.contains("    \"planner\" -> \"join\" [style=dashed];"));
        assert!(d.ends_with("}\n"));
    }
}
