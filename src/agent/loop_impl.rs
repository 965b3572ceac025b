//! Agent loop - core message processing

use std::sync::Arc;

use tracing::{debug, info};
use crate::Result;
use crate::error::Error;
use crate::tools::ToolRunner;
use super::llm::LlmClient;
use super::message::{Message, ToolCallRequest};

/// The agent loop processes a conversation through the LLM and tool execution
pub struct AgentLoop {
    client: Arc<dyn LlmClient>,
    tools: ToolRunner,
    system_prompt: String,
    max_iterations: usize,
}

impl AgentLoop {
    /// Create a new agent loop
    pub fn new(
        client: Arc<dyn LlmClient>,
        tools: ToolRunner,
        system_prompt: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            client,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRunner {
        &self.tools
    }

    /// Run the loop over `conversation` until the model answers without
    /// requesting tools.
    ///
    /// Returns the conversation followed by every message the agent added;
    /// the last element is the final reply.
    pub async fn run(&self, conversation: &[Message]) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(conversation.len() + 2);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend(conversation.iter().cloned());

        info!("Starting agent loop with {} messages", conversation.len());

        let tools = self.tools.definitions();
        let mut total_tokens = 0;

        for iteration in 0..self.max_iterations {
            debug!("Iteration {}/{}", iteration + 1, self.max_iterations);

            let response = self.client.chat(&messages, &tools).await?;
            total_tokens += response.usage.total_tokens;
            debug!(
                "LLM stopped with '{}' ({} prompt + {} completion tokens)",
                response.finish_reason, response.usage.prompt_tokens, response.usage.completion_tokens
            );

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                info!(
                    "Agent completed with response: {} chars, {} tokens",
                    content.len(),
                    total_tokens
                );
                messages.push(Message::assistant(content));
                messages.remove(0);
                return Ok(messages);
            }

            messages.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for tool_call in &response.tool_calls {
                let result = self.execute_tool(tool_call).await;
                messages.push(Message::tool_result(&tool_call.id, result));
            }
        }

        Err(Error::MaxIterations)
    }

    async fn execute_tool(&self, tool_call: &ToolCallRequest) -> String {
        debug!("Executing tool: {} with args: {}", tool_call.name, tool_call.arguments);

        match self.tools.execute(&tool_call.name, tool_call.arguments.clone()).await {
            Ok(result) => {
                debug!("Tool {} succeeded: {} chars", tool_call.name, result.len());
                result
            }
            Err(e) => {
                let error_msg = format!("Error: {}", e);
                debug!("Tool {} failed: {}", tool_call.name, error_msg);
                error_msg
            }
        }
    }
}
