use std::sync::Arc;

use tracing::debug;

use switchyard_core::config::{EdgeConfig, ModelConfig, NodeConfig, NodeKindConfig, WorkflowConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;

use crate::builder::WorkflowBuilder;
use crate::node::{AgentNode, GateSpec, Node};

impl WorkflowBuilder {
    /// Build from a `[workflow]` config section.
    ///
    /// `make_client` turns a resolved model config into a client; agents
    /// without a model override share one client for `default_model`.
    pub fn from_config<F>(
        config: &WorkflowConfig,
        default_model: &ModelConfig,
        mut make_client: F,
    ) -> Result<Self>
    where
        F: FnMut(&ModelConfig) -> Result<Arc<dyn LlmClient>>,
    {
        let mut shared: Option<Arc<dyn LlmClient>> = None;
        let mut to_node = |node: &NodeConfig| -> Result<Node> {
            let built = match &node.kind {
                NodeKindConfig::Agent {
                    instructions,
                    model,
                    streaming,
                } => {
                    let (model, client) = match model {
                        Some(model) => (model.clone(), make_client(model)?),
                        None => {
                            let client = match &shared {
                                Some(client) => client.clone(),
                                None => {
                                    let client = make_client(default_model)?;
                                    shared = Some(client.clone());
                                    client
                                }
                            };
                            (default_model.clone(), client)
                        }
                    };
                    let agent = AgentNode::new(client, model)
                        .with_instructions(instructions.as_str())
                        .with_streaming(*streaming);
                    Node::agent(&node.id, agent)
                }
                NodeKindConfig::Broadcast => Node::broadcast(&node.id),
                NodeKindConfig::Aggregate { expected: None } => Node::aggregate(&node.id),
                NodeKindConfig::Aggregate {
                    expected: Some(n),
                } => Node::aggregate_of(&node.id, *n),
                NodeKindConfig::HumanGate {
                    prompt,
                    approve_token,
                    reroute_to,
                } => {
                    let mut gate = GateSpec::new(prompt.as_str()).with_approve_token(approve_token.as_str());
                    if let Some(target) = reroute_to {
                        gate = gate.with_reroute_to(target.as_str());
                    }
                    Node::human_gate(&node.id, gate)
                }
            };
            Ok(built)
        };

        let start = config
            .nodes
            .iter()
            .find(|n| n.id == config.start)
            .ok_or_else(|| {
                SwitchyardError::Config(format!("start node '{}' is not declared", config.start))
            })?;

        let mut builder = WorkflowBuilder::new(to_node(start)?).with_name(config.name.as_str());
        for node in config.nodes.iter().filter(|n| n.id != config.start) {
            builder.add_node(to_node(node)?)?;
        }

        for edge in &config.edges {
            match edge {
                EdgeConfig::Direct { from, to } => builder.add_edge(from, to)?,
                EdgeConfig::FanOut { from, targets } => {
                    builder.add_fan_out_edge(from, targets.iter().map(String::as_str))?
                }
                EdgeConfig::FanIn { sources, to } => {
                    builder.add_fan_in_edge(sources.iter().map(String::as_str), to)?
                }
            };
        }

        if !config.outputs.is_empty() {
            builder.with_output_from(config.outputs.iter().map(String::as_str))?;
        }

        debug!(
            workflow = %config.name,
            nodes = config.nodes.len(),
            edges = config.edges.len(),
            "Loaded workflow from config"
        );
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::config::AppConfig;
    use switchyard_test_utils::ScriptedLlm;

    const CONFIG: &str = r#"
[model]
model_id = "gpt-4o-mini"

[workflow]
name = "hr"
start = "manager"
outputs = ["boss"]

[[workflow.nodes]]
id = "manager"
kind = "agent"
instructions = "You are a hiring manager."

[[workflow.nodes]]
id = "critic"
kind = "agent"
instructions = "You critique."
[workflow.nodes.model]
model_id = "gpt-4o"

[[workflow.nodes]]
id = "boss"
kind = "human_gate"
prompt = "Boss, can you confirm this?"

[[workflow.edges]]
type = "direct"
from = "manager"
to = "critic"

[[workflow.edges]]
type = "direct"
from = "critic"
to = "boss"
"#;

    #[test]
    fn test_from_config_shares_default_client() {
        let config: AppConfig = toml::from_str(CONFIG).unwrap();
        let wf_config = config.workflow.as_ref().unwrap();

        let mut requested = Vec::new();
        let builder = WorkflowBuilder::from_config(wf_config, &config.model, |model| {
            requested.push(model.model_id.clone());
            Ok(Arc::new(ScriptedLlm::replying("ok")) as Arc<dyn LlmClient>)
        })
        .unwrap();
        assert_eq!(requested, vec!["gpt-4o-mini", "gpt-4o"]);

        let wf = builder.build().unwrap();
        assert_eq!(wf.name(), "hr");
        assert_eq!(wf.start(), "manager");
        assert_eq!(wf.reroute_target("boss"), Some("critic"));
        let critic = wf.node("critic").unwrap().as_agent().unwrap();
        assert_eq!(critic.model.model_id, "gpt-4o");
        assert_eq!(critic.instructions, "You critique.");
    }

    #[test]
    fn test_from_config_missing_start() {
        let mut config: AppConfig = toml::from_str(CONFIG).unwrap();
        let wf_config = config.workflow.as_mut().unwrap();
        wf_config.start = "ghost".into();

        let err = WorkflowBuilder::from_config(wf_config, &config.model, |_| {
            Ok(Arc::new(ScriptedLlm::new()) as Arc<dyn LlmClient>)
        })
        .unwrap_err();
        assert!(matches!(err, SwitchyardError::Config(msg) if msg.contains("ghost")));
    }
}
