//! Workflow graphs for LLM agents.
//!
//! A [`Workflow`] is a directed graph of agent and control nodes that pass
//! immutable chat messages along edges. Build one with [`WorkflowBuilder`],
//! then [`Workflow::run`] it: independent branches execute concurrently,
//! aggregates join fan-in branches, human gates suspend for approval, and
//! every step is reported on the run's event stream.

mod agent;
pub mod aggregate;
pub mod approval;
pub mod builder;
pub mod edge;
pub mod executor;
pub mod export;
mod gate;
pub mod graph;
mod loader;
pub mod node;
pub mod sink;

pub use aggregate::FanInBuffer;
pub use approval::ApprovalBroker;
pub use builder::WorkflowBuilder;
pub use edge::{Edge, EdgeMode};
pub use executor::{EventStream, RunOptions, RunOutcome, WorkflowRun};
pub use graph::Workflow;
pub use node::{AgentNode, GateSpec, Node, NodeKind};
pub use sink::EventSink;
