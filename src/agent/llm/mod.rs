//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for building the configured provider
//! - [`AnthropicClient`], the Anthropic Messages API implementation
//!
//! Sampling is pinned to temperature 0 ([`DETERMINISTIC_TEMPERATURE`]):
//! the agent always takes its most likely next step.

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub use types::*;

pub mod anthropic;

pub use anthropic::AnthropicClient;

use super::message::{Message, ToolCallRequest};

/// Sampling temperature used for every agent completion.
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "end_turn".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Chat-completion provider.
///
/// The first [`Message`] may be a system message; providers lift it into
/// their own system-instruction slot.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send messages and get response.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Creates the LLM client from configuration.
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an Anthropic client from configuration.
    pub fn create(config: &Config) -> Result<Arc<dyn LlmClient>> {
        if config.anthropic_api_key.is_empty() {
            return Err(Error::Config("ANTHROPIC_API_KEY is not set".to_string()));
        }
        let client = AnthropicClient::new(&config.anthropic_api_key, &config.model)
            .with_max_tokens(config.max_tokens);
        Ok(Arc::new(client))
    }
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    /// Every message list the client was called with.
    pub seen: std::sync::Mutex<Vec<Vec<Message>>>,
    /// Tool names offered on each call.
    pub seen_tools: std::sync::Mutex<Vec<Vec<String>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    fn from_responses(responses: Vec<Result<LlmResponse>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            seen: std::sync::Mutex::new(Vec::new()),
            seen_tools: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::from_responses(responses.iter().map(|s| Ok(LlmResponse::text(*s))).collect())
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        let tool_response = LlmResponse {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "tc_1".to_string(),
                name: name.to_string(),
                arguments: args,
            }],
            finish_reason: "tool_use".to_string(),
            usage: Usage::default(),
        };

        Self::from_responses(vec![Ok(tool_response), Ok(LlmResponse::text(final_response))])
    }

    /// Create a client whose first call fails.
    pub fn failing(message: &str) -> Self {
        Self::from_responses(vec![Err(Error::Llm(message.to_string()))])
    }

    /// System prompt of the first call, if any.
    pub fn first_system_prompt(&self) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .first()
            .and_then(|messages| messages.first())
            .filter(|m| m.role == super::message::Role::System)
            .map(|m| m.content.clone())
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("No more fake responses".to_string())))
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
