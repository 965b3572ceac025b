//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// Default location of the garden tool-provider script inside the container.
pub const DEFAULT_TOOL_SERVER_PATH: &str = "/app/gardenbook_chat/plants-mcp/garden_mcp.py";

/// Default bound on each tool-provider setup request, in seconds.
pub const DEFAULT_TOOL_SETUP_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the user-data service
    #[serde(default = "default_node_api_url")]
    pub node_api_url: String,

    /// How to launch the tool-provider process
    #[serde(default)]
    pub tool_server: ToolServerConfig,

    /// Anthropic API key
    #[serde(default)]
    pub anthropic_api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum tool iterations per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for the encyclopedia lookup, in seconds
    #[serde(default = "default_encyclopedia_timeout_secs")]
    pub encyclopedia_timeout_secs: u64,

    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Command line used to spawn the tool provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_tool_command")]
    pub command: String,

    #[serde(default = "default_tool_args")]
    pub args: Vec<String>,

    /// Bound on the handshake and on capability discovery, in seconds
    #[serde(default = "default_tool_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: default_tool_command(),
            args: default_tool_args(),
            setup_timeout_secs: default_tool_setup_timeout_secs(),
        }
    }
}

fn default_node_api_url() -> String {
    "http://gardenbook-db-api:3001".to_string()
}

fn default_tool_command() -> String {
    "python".to_string()
}

fn default_tool_args() -> Vec<String> {
    vec![DEFAULT_TOOL_SERVER_PATH.to_string()]
}

fn default_tool_setup_timeout_secs() -> u64 {
    DEFAULT_TOOL_SETUP_TIMEOUT_SECS
}

fn default_model() -> String {
    "claude-3-7-sonnet-latest".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_iterations() -> usize {
    20
}

fn default_encyclopedia_timeout_secs() -> u64 {
    5
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_api_url: default_node_api_url(),
            tool_server: ToolServerConfig::default(),
            anthropic_api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            encyclopedia_timeout_secs: default_encyclopedia_timeout_secs(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Encyclopedia lookup timeout.
    pub fn encyclopedia_timeout(&self) -> Duration {
        Duration::from_secs(self.encyclopedia_timeout_secs)
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NODE_API_URL") {
            self.node_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = key;
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            self.model = model;
        }
        if let Some(command) = lookup("GARDEN_MCP_COMMAND") {
            self.tool_server.command = command;
        }
        if let Some(path) = lookup("GARDEN_MCP_SERVER_PATH") {
            self.tool_server.args = vec![path];
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT: {port}")))?;
        }
        Ok(())
    }
}

/// Load configuration from an optional JSON file, then apply environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!("Config not found at {:?}", path)));
            }
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        }
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "claude-3-7-sonnet-latest");
        assert_eq!(config.node_api_url, "http://gardenbook-db-api:3001");
        assert_eq!(config.tool_server.command, "python");
        assert_eq!(config.tool_server.args, vec![DEFAULT_TOOL_SERVER_PATH]);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NODE_API_URL", "http://localhost:3001/"),
            ("GARDEN_MCP_SERVER_PATH", "/tmp/garden_mcp.py"),
            ("PORT", "9000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.node_api_url, "http://localhost:3001");
        assert_eq!(config.tool_server.args, vec!["/tmp/garden_mcp.py"]);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_invalid_port_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"max_iterations": 3, "max_tokens": 1024, "tool_server": {"setup_timeout_secs": 7}}"#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.tool_server.setup_timeout_secs, 7);
        assert_eq!(config.tool_server.command, "python");
        assert_eq!(config.encyclopedia_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(Some(&dir.path().join("nope.json")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
