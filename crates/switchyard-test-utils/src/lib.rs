//! Scripted collaborators for exercising workflows without a network.

mod approval;
mod llm;

pub use approval::ScriptedApproval;
pub use llm::{Reply, ScriptedLlm};

use std::io::Write;

use switchyard_core::config::AppConfig;

/// Write `toml` to a temp file and load it as an [`AppConfig`].
///
/// The returned guard keeps the file alive for the duration of the test.
pub fn load_config_str(toml: &str) -> (tempfile::NamedTempFile, AppConfig) {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(toml.as_bytes()).expect("write temp config");
    let config = AppConfig::load(file.path()).expect("load temp config");
    (file, config)
}

/// A minimal valid config document with only a `[model]` section.
pub fn minimal_config_toml() -> String {
    let value = serde_json::json!({ "model": { "model_id": "test-model" } });
    toml::to_string(&value).expect("serialize minimal config")
}
