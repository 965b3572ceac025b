//! Agent sessions.
//!
//! A session owns one live tool-provider connection and the agent bound to
//! its capabilities. It lives for exactly one chat request:
//!
//! ```text
//! uninitialized -> connecting -> ready <-> invoking
//!                      |           |
//!                      +-----------+--> released
//! ```
//!
//! A failed connect goes straight to `released`. Dropping a session that
//! was never released still stops the provider, since the child process
//! is killed when its handle drops.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tools::{ToolClient, ToolLauncher, ToolRunner};
use crate::Result;

use super::llm::LlmClient;
use super::loop_impl::AgentLoop;
use super::message::Message;

/// Lifecycle state of an [`AgentSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Ready,
    Invoking,
    Released,
}

/// The language model an agent reasons with.
#[derive(Clone)]
pub struct ModelBinding {
    pub llm: Arc<dyn LlmClient>,
    pub max_iterations: usize,
}

/// Scoped, single-use agent bound to one tool-provider connection.
pub struct AgentSession {
    state: SessionState,
    client: Option<Arc<dyn ToolClient>>,
    agent: Option<AgentLoop>,
}

impl AgentSession {
    /// Start a tool provider, discover its capabilities and bind them to an
    /// agent that uses `operating_prompt` as its system instructions.
    pub async fn acquire(
        launcher: &dyn ToolLauncher,
        operating_prompt: impl Into<String>,
        model: &ModelBinding,
    ) -> Result<Self> {
        let mut session = Self {
            state: SessionState::Uninitialized,
            client: None,
            agent: None,
        };

        session.state = SessionState::Connecting;
        debug!("Starting tool provider");

        let client = match launcher.launch().await {
            Ok(client) => client,
            Err(e) => {
                session.state = SessionState::Released;
                return Err(Error::Session(e.to_string()));
            }
        };

        let tools = match ToolRunner::from_client(client.clone()).await {
            Ok(tools) => tools,
            Err(e) => {
                session.state = SessionState::Released;
                if let Err(close_err) = client.close().await {
                    warn!("Failed to close tool provider after discovery error: {}", close_err);
                }
                return Err(Error::Session(e.to_string()));
            }
        };

        info!("Agent session ready with {} tools", tools.len());

        session.agent = Some(AgentLoop::new(
            model.llm.clone(),
            tools,
            operating_prompt,
            model.max_iterations,
        ));
        session.client = Some(client);
        session.state = SessionState::Ready;
        Ok(session)
    }

    /// Acquire a session, invoke it once, and release it whatever the outcome.
    pub async fn run_once(
        launcher: &dyn ToolLauncher,
        operating_prompt: impl Into<String>,
        model: &ModelBinding,
        conversation: &[Message],
    ) -> Result<Vec<Message>> {
        let mut session = Self::acquire(launcher, operating_prompt, model).await?;
        let outcome = session.invoke(conversation).await;
        if let Err(e) = session.release().await {
            warn!("Failed to release agent session: {}", e);
        }
        outcome
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn agent(&self) -> Option<&AgentLoop> {
        self.agent.as_ref()
    }

    /// Run the agent over `conversation`, returning its full message list.
    pub async fn invoke(&mut self, conversation: &[Message]) -> Result<Vec<Message>> {
        if self.state != SessionState::Ready {
            return Err(Error::SessionReleased);
        }
        let agent = self.agent.as_ref().ok_or(Error::SessionReleased)?;

        self.state = SessionState::Invoking;
        info!("Invoking agent with {} messages", conversation.len());
        let outcome = agent.run(conversation).await;
        self.state = SessionState::Ready;

        outcome.map_err(|e| Error::Invocation(e.to_string()))
    }

    /// Close the tool-provider connection. The session is unusable afterwards.
    pub async fn release(mut self) -> Result<()> {
        self.close().await
    }

    async fn close(&mut self) -> Result<()> {
        self.state = SessionState::Released;
        self.agent = None;
        match self.client.take() {
            Some(client) => {
                debug!("Closing tool provider");
                client.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if self.state != SessionState::Released {
            warn!("Agent session dropped in state {:?} without release", self.state);
        }
    }
}
