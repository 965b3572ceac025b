//! Anthropic LLM client implementation (Messages API).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{
    AnthropicErrorBody, AnthropicResponse, ContentBlock, LlmClient, LlmResponse, Usage,
    DETERMINISTIC_TEMPERATURE,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client using API key authentication.
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    client: Client,
}

impl AnthropicClient {
    /// Create a new Anthropic client with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: 4096,
            base_url: ANTHROPIC_API_URL.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut request = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": DETERMINISTIC_TEMPERATURE,
            "messages": self.convert_messages(messages),
        });

        if let Some(system) = self.get_system_instruction(messages) {
            request["system"] = json!(system);
        }

        if !tools.is_empty() {
            request["tools"] = self.convert_tools(tools);
        }

        request
    }

    /// Convert to Anthropic turns. Consecutive tool results are merged into
    /// one user turn, as the API requires.
    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut turns: Vec<Value> = Vec::with_capacity(messages.len());

        for m in messages {
            match m.role {
                Role::System => {}
                Role::User => turns.push(json!({"role": "user", "content": m.content})),
                Role::Assistant => {
                    let Some(ref tool_calls) = m.tool_calls else {
                        turns.push(json!({"role": "assistant", "content": m.content}));
                        continue;
                    };

                    let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                    if !m.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": m.content}));
                    }
                    blocks.extend(tool_calls.iter().map(|tc| {
                        json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.arguments
                        })
                    }));
                    turns.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Tool => {
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.as_deref().unwrap_or("unknown"),
                        "content": m.content
                    });

                    let merged = turns.last_mut().and_then(|last| {
                        let is_results = last["role"] == "user"
                            && last["content"]
                                .as_array()
                                .map(|c| c.iter().all(|b| b["type"] == "tool_result"))
                                .unwrap_or(false);
                        if is_results {
                            last["content"].as_array_mut()
                        } else {
                            None
                        }
                    });

                    match merged {
                        Some(content) => content.push(block),
                        None => turns.push(json!({"role": "user", "content": [block]})),
                    }
                }
            }
        }

        turns
    }

    fn get_system_instruction(&self, messages: &[Message]) -> Option<String> {
        messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Value {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters
                })
            })
            .collect()
    }

    fn parse_response(&self, response: AnthropicResponse) -> LlmResponse {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallRequest {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        let usage = response
            .usage
            .map(|u| {
                let prompt_tokens = u.input_tokens.unwrap_or(0);
                let completion_tokens = u.output_tokens.unwrap_or(0);
                Usage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                }
            })
            .unwrap_or_default();

        LlmResponse {
            content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
            tool_calls,
            finish_reason: response.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            usage,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools);

        let response = self
            .client
            .post(self.build_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            let detail = serde_json::from_str::<AnthropicErrorBody>(&error_text)
                .map(|body| format!("{}: {}", body.error.kind, body.error.message))
                .unwrap_or(error_text);
            return Err(Error::Llm(format!("Anthropic API error ({status}): {detail}")));
        }

        let anthropic_response: AnthropicResponse = response.json().await?;
        Ok(self.parse_response(anthropic_response))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
