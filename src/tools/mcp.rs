//! Stdio tool-provider client.
//!
//! The provider is a child process speaking newline-delimited JSON-RPC 2.0
//! on stdin/stdout (the MCP stdio transport). Its stderr is inherited so
//! provider logs end up next to ours.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ToolServerConfig;
use crate::error::Error;
use crate::Result;
use super::{ToolClient, ToolDefinition, ToolLauncher};

const PROTOCOL_VERSION: &str = "2024-11-05";


/// How long the provider gets to exit on its own after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Connection {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Client for one tool-provider child process.
pub struct McpClient {
    conn: Mutex<Connection>,
    next_id: AtomicU64,
    closed: AtomicBool,
    /// Bound on each session-setup request (`initialize`, `tools/list`).
    setup_timeout: Duration,
}

impl McpClient {
    /// Spawn the provider. No messages are exchanged yet.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tool(format!("Failed to start tool provider '{}': {}", command, e)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Tool("Tool provider stdout unavailable".to_string()))?;

        debug!("Spawned tool provider '{}' (pid {:?})", command, child.id());

        Ok(Self {
            conn: Mutex::new(Connection {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            setup_timeout: Duration::from_secs(crate::config::DEFAULT_TOOL_SETUP_TIMEOUT_SECS),
        })
    }

    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }

    /// Perform the `initialize` handshake.
    pub async fn initialize(&self) -> Result<()> {
        let result = self
            .setup_request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;

        if let Some(server) = result.get("serverInfo").and_then(|s| s.get("name")).and_then(Value::as_str) {
            info!("Connected to tool provider '{}'", server);
        }

        self.notify("notifications/initialized", json!({})).await
    }

    async fn setup_request(&self, method: &str, params: Value) -> Result<Value> {
        tokio::time::timeout(self.setup_timeout, self.request(method, params))
            .await
            .map_err(|_| {
                Error::Tool(format!(
                    "Tool provider did not answer '{}' within {:?}",
                    method, self.setup_timeout
                ))
            })?
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Tool("Tool provider connection is closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let mut conn = self.conn.lock().await;
        write_line(&mut conn, &message).await?;

        loop {
            let line = conn
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| Error::Tool(format!("Tool provider exited during '{}'", method)))?;

            let reply: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(_) => {
                    debug!("Skipping non-JSON provider output: {}", line);
                    continue;
                }
            };

            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                // notifications and server-initiated requests
                continue;
            }

            if let Some(error) = reply.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Error::Tool(format!("{} failed: {}", method, message)));
            }

            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        let mut conn = self.conn.lock().await;
        write_line(&mut conn, &message).await
    }
}

async fn write_line(conn: &mut Connection, message: &Value) -> Result<()> {
    let stdin = conn
        .stdin
        .as_mut()
        .ok_or_else(|| Error::Tool("Tool provider stdin is closed".to_string()))?;

    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Flatten a `tools/call` result into text for the model.
fn render_content(result: &Value) -> String {
    let Some(items) = result.get("content").and_then(Value::as_array) else {
        return result.to_string();
    };

    items
        .iter()
        .map(|item| match (item.get("type").and_then(Value::as_str), item.get("text").and_then(Value::as_str)) {
            (Some("text"), Some(text)) => text.to_string(),
            _ => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolClient for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self.setup_request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Tool("tools/list returned no tool array".to_string()))?;

        tools
            .iter()
            .map(|tool| {
                let name = tool
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Tool("Tool without a name".to_string()))?;
                Ok(ToolDefinition {
                    name: name.to_string(),
                    description: tool
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    parameters: tool
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                })
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let text = render_content(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(Error::Tool(text));
        }
        Ok(text)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        // EOF on stdin asks the provider to exit
        drop(conn.stdin.take());

        match tokio::time::timeout(SHUTDOWN_GRACE, conn.child.wait()).await {
            Ok(Ok(status)) => debug!("Tool provider exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for tool provider: {}", e),
            Err(_) => {
                warn!("Tool provider did not exit, killing it");
                conn.child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Launches a fresh provider process per call.
pub struct McpLauncher {
    server: ToolServerConfig,
    setup_timeout: Duration,
}

impl McpLauncher {
    pub fn new(server: ToolServerConfig) -> Self {
        let setup_timeout = Duration::from_secs(server.setup_timeout_secs);
        Self { server, setup_timeout }
    }

    /// Override the per-request setup bound (sub-second values for tests).
    pub fn with_setup_timeout(mut self, setup_timeout: Duration) -> Self {
        self.setup_timeout = setup_timeout;
        self
    }
}

#[async_trait]
impl ToolLauncher for McpLauncher {
    async fn launch(&self) -> Result<Arc<dyn ToolClient>> {
        let client = McpClient::spawn(&self.server.command, &self.server.args)?
            .with_setup_timeout(self.setup_timeout);

        if let Err(e) = client.initialize().await {
            if let Err(close_err) = client.close().await {
                warn!("Failed to stop tool provider after handshake error: {}", close_err);
            }
            return Err(e);
        }

        Ok(Arc::new(client))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Scripted provider: answers initialize, tools/list and one tools/call.
    const GARDEN_SCRIPT: &str = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"garden","version":"0.1"}}}'
read -r line
read -r line
echo 'starting up'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}'
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"list_plants","description":"List the user plants","inputSchema":{"type":"object","properties":{"userId":{"type":"string"}}}},{"name":"noop"}]}}'
read -r line
echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"Basil"},{"type":"text","text":"Tomato"}],"isError":false}}'
read -r line
echo '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"plant not found"}],"isError":true}}'
read -r line
"#;

    fn sh_launcher(script: &str) -> McpLauncher {
        McpLauncher::new(ToolServerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..ToolServerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_handshake_discovery_and_calls() {
        let client = sh_launcher(GARDEN_SCRIPT).launch().await.unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "list_plants");
        assert_eq!(tools[0].description, "List the user plants");
        assert_eq!(tools[0].parameters["properties"]["userId"]["type"], "string");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].parameters["type"], "object");

        let text = client.call_tool("list_plants", json!({"userId": "u1"})).await.unwrap();
        assert_eq!(text, "Basil\nTomato");

        let err = client.call_tool("list_plants", json!({"userId": "u2"})).await.unwrap_err();
        assert!(err.to_string().contains("plant not found"));

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.list_tools().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_launch() {
        let launcher = McpLauncher::new(ToolServerConfig {
            command: "/nonexistent/garden-mcp".to_string(),
            args: vec![],
            ..ToolServerConfig::default()
        });
        let err = launcher.launch().await.err().unwrap();
        assert!(err.to_string().contains("Failed to start tool provider"));
    }

    #[tokio::test]
    async fn test_provider_crash_on_launch() {
        let err = sh_launcher("exit 3").launch().await.err().unwrap();
        assert!(matches!(err, Error::Tool(_) | Error::Io(_)));
    }

    #[tokio::test]
    async fn test_handshake_stall_times_out() {
        let launcher = sh_launcher("exec sleep 600").with_setup_timeout(Duration::from_millis(300));
        let err = launcher.launch().await.err().unwrap();
        assert!(err.to_string().contains("'initialize'"));
    }

    #[tokio::test]
    async fn test_discovery_stall_fails_session_setup() {
        use crate::agent::llm::FakeLlmClient;
        use crate::agent::{AgentSession, ModelBinding};

        // answers the handshake, then never answers tools/list
        let script = r#"
read -r line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"garden","version":"0.1"}}}'
read -r line
exec sleep 600
"#;
        let launcher = sh_launcher(script).with_setup_timeout(Duration::from_millis(300));
        let llm = Arc::new(FakeLlmClient::new(vec!["unused"]));
        let model = ModelBinding { llm: llm.clone(), max_iterations: 5 };

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            AgentSession::acquire(&launcher, "prompt", &model),
        )
        .await
        .expect("session setup must not hang");

        let err = result.err().unwrap();
        assert!(matches!(err, Error::Session(ref m) if m.contains("tools/list")));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(llm.call_count(), 0);
    }

    #[test]
    fn test_render_non_text_content() {
        let result = json!({"content": [{"type": "image", "data": "AAAA"}]});
        assert!(render_content(&result).contains("\"image\""));
        assert_eq!(render_content(&json!({"ok": true})), r#"{"ok":true}"#);
    }
}
