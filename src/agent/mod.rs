//! Agent: operating prompt, reasoning loop, per-request session.
//!
//! This module contains:
//! - Message types (Message, Role, ToolCallRequest)
//! - LLM client trait and the Anthropic implementation
//! - Agent loop for tool-using conversations
//! - Operating prompt construction
//! - Scoped agent sessions bound to a tool provider

mod context;
mod loop_impl;
mod message;
mod session;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::{build_operating_prompt, resolve_timezone, SessionContext};
pub use llm::{AnthropicClient, LlmClient, LlmResponse, ProviderRegistry, Usage};
pub use loop_impl::AgentLoop;
pub use message::{Message, Role, ToolCallRequest};
pub use session::{AgentSession, ModelBinding, SessionState};
