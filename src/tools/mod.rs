//! Tools module - agent capabilities
//!
//! Capabilities come from an external tool-provider process. A
//! [`ToolLauncher`] starts one provider and hands back a live
//! [`ToolClient`]; each capability the client discovers is wrapped as a
//! [`Tool`] and registered in a [`ToolRunner`] for the agent loop.

mod runner;
pub mod mcp;

pub use mcp::{McpClient, McpLauncher};
pub use runner::{ToolDefinition, ToolRunner};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<String>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Live connection to one tool-provider process.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Capabilities the provider exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke one capability and return its textual result.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;

    /// Shut the connection down. Calls after the first are no-ops.
    async fn close(&self) -> Result<()>;
}

/// Starts tool-provider processes.
#[async_trait]
pub trait ToolLauncher: Send + Sync {
    /// Start a provider and complete its handshake.
    async fn launch(&self) -> Result<Arc<dyn ToolClient>>;
}

/// A capability served by a [`ToolClient`].
pub struct RemoteTool {
    definition: ToolDefinition,
    client: Arc<dyn ToolClient>,
}

impl RemoteTool {
    pub fn new(definition: ToolDefinition, client: Arc<dyn ToolClient>) -> Self {
        Self { definition, client }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str { &self.definition.name }
    fn description(&self) -> &str { &self.definition.description }
    fn parameters(&self) -> Value { self.definition.parameters.clone() }

    async fn execute(&self, params: Value) -> Result<String> {
        self.client.call_tool(&self.definition.name, params).await
    }

    fn to_definition(&self) -> ToolDefinition {
        self.definition.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process stand-ins for a tool provider.

    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that serves a fixed tool list and echoes calls.
    pub struct FakeToolClient {
        pub tools: Vec<ToolDefinition>,
        pub fail_listing: bool,
        pub closed: AtomicBool,
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl FakeToolClient {
        pub fn with_tools(names: &[&str]) -> Self {
            Self {
                tools: names
                    .iter()
                    .map(|name| ToolDefinition {
                        name: name.to_string(),
                        description: format!("{name} tool"),
                        parameters: serde_json::json!({"type": "object"}),
                    })
                    .collect(),
                fail_listing: false,
                closed: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolClient for FakeToolClient {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
            if self.fail_listing {
                return Err(Error::Tool("tools/list failed".to_string()));
            }
            Ok(self.tools.clone())
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            Ok(format!("{name} -> {arguments}"))
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Launcher that hands out one shared fake client, or fails to start.
    pub struct FakeLauncher {
        pub client: Option<Arc<FakeToolClient>>,
        pub launches: AtomicUsize,
    }

    impl FakeLauncher {
        pub fn serving(client: Arc<FakeToolClient>) -> Self {
            Self { client: Some(client), launches: AtomicUsize::new(0) }
        }

        pub fn broken() -> Self {
            Self { client: None, launches: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ToolLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Arc<dyn ToolClient>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            match &self.client {
                Some(client) => Ok(client.clone() as Arc<dyn ToolClient>),
                None => Err(Error::Tool("spawn python: No such file or directory".to_string())),
            }
        }
    }
}
