use std::io::Write;

use switchyard_core::config::{AppConfig, EdgeConfig, NodeKindConfig};
use switchyard_core::SwitchyardError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[model]
provider = "github"
model_id = "gpt-4o"
api_key = "ghp-test-key"
base_url = "https://models.github.ai/inference"
max_tokens = 1024
temperature = 0.5

[model.extra_headers]
X-Team = "travel"

[run]
node_timeout_secs = 30
run_timeout_secs = 0
max_approval_rounds = 2
emit_partial_output = false

[workflow]
name = "hiring"
start = "manager"
outputs = ["writer"]

[[workflow.nodes]]
id = "manager"
kind = "agent"
instructions = "Pick a candidate."

[workflow.nodes.model]
model_id = "gpt-4o-mini"

[[workflow.nodes]]
id = "boss"
kind = "human_gate"
prompt = "Boss, can you confirm this?"
approve_token = "approved"
reroute_to = "manager"

[[workflow.nodes]]
id = "writer"
kind = "agent"

[[workflow.edges]]
type = "direct"
from = "manager"
to = "boss"

[[workflow.edges]]
type = "direct"
from = "boss"
to = "writer"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "github");
    assert_eq!(config.model.model_id, "gpt-4o");
    assert_eq!(config.model.api_key, Some("ghp-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 1024);
    assert_eq!(config.model.extra_headers["X-Team"], "travel");

    assert_eq!(config.run.node_timeout_secs, 30);
    assert_eq!(config.run.run_timeout_secs, 0);
    assert_eq!(config.run.max_approval_rounds, 2);
    assert!(!config.run.emit_partial_output);
    assert_eq!(config.run.approval_timeout_secs, 600);

    let wf = config.workflow.expect("workflow present");
    assert_eq!(wf.name, "hiring");
    assert_eq!(wf.outputs, vec!["writer"]);
    match &wf.nodes[0].kind {
        NodeKindConfig::Agent {
            model: Some(model),
            streaming,
            ..
        } => {
            assert_eq!(model.model_id, "gpt-4o-mini");
            assert!(*streaming);
        }
        other => panic!("unexpected kind: {:?}", other),
    }
    match &wf.nodes[1].kind {
        NodeKindConfig::HumanGate {
            approve_token,
            reroute_to,
            ..
        } => {
            assert_eq!(approve_token, "approved");
            assert_eq!(reroute_to.as_deref(), Some("manager"));
        }
        other => panic!("unexpected kind: {:?}", other),
    }
    assert!(matches!(&wf.edges[1], EdgeConfig::Direct { from, to } if from == "boss" && to == "writer"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SWITCHYARD_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${SWITCHYARD_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("SWITCHYARD_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let (_guard, config) =
        switchyard_test_utils::load_config_str(&switchyard_test_utils::minimal_config_toml());

    assert_eq!(config.model.model_id, "test-model");
    assert_eq!(config.model.max_tokens, 4096);
    assert_eq!(config.run.run_timeout_secs, 900);
    assert_eq!(config.run.event_capacity, 256);
    assert!(config.workflow.is_none());
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("absent.toml");

    let err = AppConfig::load(&path).unwrap_err();
    assert!(matches!(err, SwitchyardError::ConfigNotFound(p) if p.ends_with("absent.toml")));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model\nmodel_id = ").expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, SwitchyardError::Config(_)));
}

#[test]
fn test_unknown_node_kind_rejected() {
    let toml_content = r#"
[model]
model_id = "test-model"

[workflow]
start = "a"

[[workflow.nodes]]
id = "a"
kind = "teleporter"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    assert!(matches!(
        AppConfig::load(tmp.path()),
        Err(SwitchyardError::Config(_))
    ));
}
