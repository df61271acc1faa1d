pub mod providers;
pub mod retry;
pub mod streaming;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// When the model carries a `[retry]` section the client is wrapped in a
/// [`RetryingClient`]; otherwise calls are attempted exactly once.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    let base: Box<dyn LlmClient> = match config.provider.as_str() {
        // OpenAI-compatible endpoints (GitHub Models, Azure OpenAI v1, Ollama, vLLM, ...)
        "openai" | "github" | "azure" | "ollama" | "openai-compatible" => {
            Box::new(OpenAiClient::new())
        }
        other => return Err(SwitchyardError::UnsupportedProvider(other.to_string())),
    };

    Ok(match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(base, retry.clone())),
        None => base,
    })
}
