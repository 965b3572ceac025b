//! Chat pipeline: one stateless request from turns to reply.
//!
//! The pipeline is the only place degradable failures are absorbed: a
//! missing encyclopedia or an unknown timezone shrinks the prompt, while
//! failures to start or run the agent propagate to the caller.

mod knowledge;

pub use knowledge::KnowledgeClient;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{AgentSession, Message, ModelBinding, Role, SessionContext};
use crate::agent::ProviderRegistry;
use crate::config::Config;
use crate::error::Error;
use crate::tools::{McpLauncher, ToolLauncher};
use crate::Result;

/// One turn as sent by the client. `role` is kept as text so that
/// unrecognised roles can be dropped instead of rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,

    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// IANA timezone identifier, e.g. "America/New_York".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_timezone: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self {
            messages,
            user_id: None,
            user_timezone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Keep `user` and `assistant` turns, in order; drop everything else.
pub fn replayable_turns(turns: &[ChatTurn]) -> Vec<Message> {
    turns
        .iter()
        .filter_map(|turn| match Role::from_turn_role(&turn.role) {
            Some(Role::User) => Some(Message::user(turn.content.as_str())),
            Some(Role::Assistant) => Some(Message::assistant(turn.content.as_str())),
            _ => {
                debug!("Dropping turn with role '{}'", turn.role);
                None
            }
        })
        .collect()
}

/// Per-request orchestrator.
pub struct ChatPipeline {
    knowledge: KnowledgeClient,
    launcher: Arc<dyn ToolLauncher>,
    model: ModelBinding,
}

impl ChatPipeline {
    pub fn new(knowledge: KnowledgeClient, launcher: Arc<dyn ToolLauncher>, model: ModelBinding) -> Self {
        Self {
            knowledge,
            launcher,
            model,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let knowledge = KnowledgeClient::new(&config.node_api_url, config.encyclopedia_timeout());
        let launcher = Arc::new(McpLauncher::new(config.tool_server.clone()));
        let model = ModelBinding {
            llm: ProviderRegistry::create(config)?,
            max_iterations: config.max_iterations,
        };
        Ok(Self::new(knowledge, launcher, model))
    }

    /// Answer one chat request.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse> {
        let conversation = replayable_turns(&request.messages);

        let knowledge_text = match request.user_id.as_deref().filter(|id| !id.is_empty()) {
            Some(user_id) => self.knowledge.fetch(user_id).await.into_value(),
            None => None,
        };

        let context = SessionContext::new(knowledge_text, request.user_timezone.as_deref());
        debug!("Resolved timezone {}", context.timezone().name());

        let messages = AgentSession::run_once(
            self.launcher.as_ref(),
            context.into_operating_prompt(),
            &self.model,
            &conversation,
        )
        .await?;

        let reply = messages
            .last()
            .map(|m| m.content.clone())
            .ok_or_else(|| Error::Invocation("Agent returned no messages".to_string()))?;

        info!("Chat reply ready: {} chars", reply.len());
        Ok(ChatResponse { response: reply })
    }
}
