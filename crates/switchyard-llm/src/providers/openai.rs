use base64::Engine;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::LlmClient;
use switchyard_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenAI, GitHub Models, Azure OpenAI, Ollama, vLLM, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (proxies, custom timeouts).
    pub fn with_http(http: Client) -> Self {
        Self { http }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiToolCall {
    id: String,
    r#type: String,
    function: OaiFunction,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiFunction {
    name: String,
    arguments: String,
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Map one content block to an OpenAI content part, if it has a wire form.
fn content_part(block: &ContentBlock) -> Option<serde_json::Value> {
    match block {
        ContentBlock::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
        ContentBlock::Binary { data, mime_type } if mime_type.starts_with("image/") => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(data);
            Some(serde_json::json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", mime_type, encoded) }
            }))
        }
        ContentBlock::Binary { mime_type, .. } => {
            warn!(mime_type = %mime_type, "Dropping non-image binary part");
            None
        }
        ContentBlock::ToolApprovalRequest {
            tool_name,
            input_summary,
            ..
        } => Some(serde_json::json!({
            "type": "text",
            "text": format!("[approval requested for {}: {}]", tool_name, input_summary)
        })),
        ContentBlock::ToolCall { .. } => None,
    }
}

pub(crate) fn convert_messages(messages: &[ChatMessage]) -> Vec<OaiMessage> {
    messages
        .iter()
        .map(|msg| {
            let has_binary = msg
                .content()
                .iter()
                .any(|b| matches!(b, ContentBlock::Binary { .. }));

            // Plain string content unless the message carries images.
            let content = if has_binary {
                let parts: Vec<_> = msg.content().iter().filter_map(content_part).collect();
                Some(serde_json::Value::Array(parts))
            } else {
                let parts: Vec<String> = msg
                    .content()
                    .iter()
                    .filter_map(content_part)
                    .filter_map(|p| p["text"].as_str().map(str::to_string))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(serde_json::Value::String(parts.join("")))
                }
            };

            let calls: Vec<OaiToolCall> = msg
                .content()
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolCall { id, name, input } => Some(OaiToolCall {
                        id: id.clone(),
                        r#type: "function".to_string(),
                        function: OaiFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();

            OaiMessage {
                role: role_name(msg.role()).to_string(),
                content,
                tool_calls: if calls.is_empty() { None } else { Some(calls) },
            }
        })
        .collect()
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            return vec![Err(SwitchyardError::LlmStream(format!(
                "malformed chunk: {}",
                e
            )))];
        }
    };

    let mut deltas = Vec::new();

    if let Some(id) = chunk.id {
        deltas.push(Ok(StreamDelta::MessageId(id)));
    }

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
        }
        if let Some(reason) = choice.finish_reason {
            let stop = match reason.as_str() {
                "tool_calls" => StopReason::ToolUse,
                "length" => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = match config.base_url.as_deref() {
                Some(base) if base.ends_with("/chat/completions") => base.to_string(),
                Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
                None => OPENAI_API_URL.to_string(),
            };

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(&messages),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                stream: true,
            };

            debug!(url = %url, model = %config.model_id, messages = body.messages.len(), "Sending chat request");

            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            for (k, v) in &config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| SwitchyardError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(SwitchyardError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());

            let delta_stream = sse_stream
                .map(|event| match event {
                    Ok(event) => futures::stream::iter(parse_chunk(event)),
                    Err(e) => futures::stream::iter(vec![Err(SwitchyardError::LlmStream(e))]),
                })
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn parse_text_delta() {
        let deltas = parse_chunk(sse(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hel"));
    }

    #[test]
    fn parse_finish_reason() {
        let deltas = parse_chunk(sse(
            r#"{"id":"chatcmpl-1","choices":[{"delta":{},"finish_reason":"length"}]}"#,
        ));
        assert!(matches!(&deltas[0], Ok(StreamDelta::MessageId(id)) if id == "chatcmpl-1"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::Stop(StopReason::MaxTokens))));
    }

    #[test]
    fn parse_done_and_usage() {
        assert!(parse_chunk(sse("[DONE]")).is_empty());
        let deltas = parse_chunk(sse(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
        ));
        assert!(matches!(
            deltas[0],
            Ok(StreamDelta::Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        ));
    }

    #[test]
    fn parse_malformed_chunk_is_error() {
        let deltas = parse_chunk(sse("{not json"));
        assert!(matches!(deltas[0], Err(SwitchyardError::LlmStream(_))));
    }

    #[test]
    fn convert_plain_messages() {
        let msgs = convert_messages(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("I would like to go to Paris."),
        ]);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(
            msgs[1].content,
            Some(serde_json::Value::String("I would like to go to Paris.".into()))
        );
        assert!(msgs[1].tool_calls.is_none());
    }

    #[test]
    fn convert_image_to_data_url() {
        let msg = ChatMessage::user("what furniture is this?").with_binary(vec![1, 2, 3], "image/png");
        let msgs = convert_messages(&[msg]);
        let parts = msgs[0].content.as_ref().unwrap().as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AQID");
    }

    #[test]
    fn convert_tool_calls() {
        let msg = ChatMessage::new(
            Role::Assistant,
            vec![ContentBlock::ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                input: serde_json::json!({"city": "Seattle"}),
            }],
        );
        let msgs = convert_messages(&[msg]);
        assert!(msgs[0].content.is_none());
        let calls = msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(calls[0].function.arguments, r#"{"city":"Seattle"}"#);
    }
}
