//! Wire types for the Anthropic Messages API.

use serde::Deserialize;
use serde_json::Value;

/// Top-level Messages API response.
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<AnthropicUsage>,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

/// Token usage.
#[derive(Debug, Deserialize)]
pub struct AnthropicUsage {
    pub input_tokens: Option<usize>,
    pub output_tokens: Option<usize>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct AnthropicErrorBody {
    pub error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}
