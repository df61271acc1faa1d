use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SwitchyardError};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub workflow: Option<WorkflowConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

impl ModelConfig {
    /// Minimal config for a model id with provider defaults.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: HashMap::new(),
            retry: None,
        }
    }
}

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Limits and switches applied to every workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Per-node timeout in seconds (0 = none).
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Whole-run timeout in seconds (0 = none).
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// How long a human gate waits for one answer (0 = forever).
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
    /// Rejections tolerated by a human gate before it gives up.
    #[serde(default = "default_max_approval_rounds")]
    pub max_approval_rounds: usize,
    /// Emit PartialOutput events for streamed agent text.
    #[serde(default = "default_emit_partial")]
    pub emit_partial_output: bool,
    /// Capacity of the shared event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout(),
            run_timeout_secs: default_run_timeout(),
            approval_timeout_secs: default_approval_timeout(),
            max_approval_rounds: default_max_approval_rounds(),
            emit_partial_output: default_emit_partial(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_node_timeout() -> u64 { 120 }
fn default_run_timeout() -> u64 { 900 }
fn default_approval_timeout() -> u64 { 600 }
fn default_max_approval_rounds() -> usize { 5 }
fn default_emit_partial() -> bool { true }
fn default_event_capacity() -> usize { 256 }

/// Declarative workflow: nodes plus edges, built by the workflow crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_name")]
    pub name: String,
    /// Id of the start node.
    pub start: String,
    /// Ids of nodes whose values become the run output.
    #[serde(default)]
    pub outputs: Vec<String>,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
}

fn default_workflow_name() -> String { "workflow".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKindConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKindConfig {
    Agent {
        #[serde(default)]
        instructions: String,
        /// Per-node model override.
        #[serde(default)]
        model: Option<ModelConfig>,
        #[serde(default = "default_streaming")]
        streaming: bool,
    },
    Broadcast,
    Aggregate {
        /// Arity; inferred from the fan-in edge when omitted.
        #[serde(default)]
        expected: Option<usize>,
    },
    HumanGate {
        prompt: String,
        #[serde(default = "default_approve_token")]
        approve_token: String,
        /// Agent re-invoked on rejection; defaults to the gate's upstream agent.
        #[serde(default)]
        reroute_to: Option<String>,
    },
}

fn default_streaming() -> bool { true }
fn default_approve_token() -> String { "yes".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeConfig {
    Direct { from: String, to: String },
    FanOut { from: String, targets: Vec<String> },
    FanIn { sources: Vec<String>, to: String },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))
    }

    /// Copy of this config safe to print (api keys masked).
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        redact_model(&mut cfg.model);
        if let Some(wf) = cfg.workflow.as_mut() {
            for node in &mut wf.nodes {
                if let NodeKindConfig::Agent {
                    model: Some(model), ..
                } = &mut node.kind
                {
                    redact_model(model);
                }
            }
        }
        cfg
    }
}

fn redact_model(model: &mut ModelConfig) {
    if model.api_key.is_some() {
        model.api_key = Some("***".to_string());
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    warn!(var = %var_name, "Environment variable not set, keeping placeholder");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
