//! Multi-server MCP toolbox.
//!
//! Connects to every enabled MCP server named in config, discovers its
//! tools, and exposes each one to the agent's `ToolRegistry` under a name of
//! the form `mcp_<server>_<tool>`. Dispatch strips that prefix back off to
//! route the call to the right server and the right underlying tool name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use stupid_core::config::{McpServerConfig, McpTransportConfig};
use stupid_tool_runtime::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

use crate::client::McpClient;
use crate::error::McpError;
use crate::types::{CallToolResult, JsonRpcRequest, JsonRpcResponse, RpcId, ToolContent, ToolInfo};

/// A live connection to one configured MCP server.
enum Remote {
    Stdio(McpClient),
    Http(HttpMcpClient),
}

impl Remote {
    fn tool_infos(&self) -> Vec<ToolInfo> {
        match self {
            Remote::Stdio(c) => c.tool_infos().into_iter().cloned().collect(),
            Remote::Http(c) => c.tools.clone(),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        match self {
            Remote::Stdio(c) => c.call_tool(name, arguments).await,
            Remote::Http(c) => c.call_tool(name, arguments).await,
        }
    }

    async fn shutdown(self) {
        if let Remote::Stdio(c) = self {
            let _ = c.shutdown().await;
        }
    }
}

/// JSON-RPC-over-HTTP client backing the `Sse`/`Http` MCP transports.
///
/// Both negotiate the same JSON-RPC request/response envelope as stdio; this
/// workspace does not keep a persistent event-stream connection open, only a
/// request/response POST per call, since no long-lived streaming MCP server
/// is part of the test matrix (see `DESIGN.md`).
struct HttpMcpClient {
    client: reqwest::Client,
    url: String,
    tools: Vec<ToolInfo>,
    next_id: std::sync::atomic::AtomicI64,
}

impl HttpMcpClient {
    async fn connect(url: String) -> Result<Self, McpError> {
        let client = reqwest::Client::new();
        let mut me = Self {
            client,
            url,
            tools: Vec::new(),
            next_id: std::sync::atomic::AtomicI64::new(1),
        };
        me.initialize().await?;
        me.discover_tools().await?;
        Ok(me)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpError> {
        let req = JsonRpcRequest::new(RpcId::Number(self.next_id()), method, params);
        let resp = self
            .client
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| McpError::ServerUnavailable(e.to_string()))?;
        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| McpError::ServerUnavailable(e.to_string()))
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": crate::types::PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "stupid-mcp-client", "version": env!("CARGO_PKG_VERSION") }
        });
        let resp = self.request("initialize", Some(params)).await?;
        if let Some(err) = resp.error {
            return Err(McpError::ServerUnavailable(err.message));
        }
        Ok(())
    }

    async fn discover_tools(&mut self) -> Result<(), McpError> {
        let resp = self.request("tools/list", None).await?;
        if let Some(err) = resp.error {
            return Err(McpError::ServerUnavailable(err.message));
        }
        let result: crate::types::ListToolsResult = serde_json::from_value(
            resp.result.ok_or_else(|| McpError::InvalidParams("missing result".to_string()))?,
        )?;
        self.tools = result.tools;
        Ok(())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let resp = self.request("tools/call", Some(params)).await?;
        if let Some(err) = resp.error {
            return Err(McpError::ToolExecution(err.message));
        }
        let result: CallToolResult = serde_json::from_value(
            resp.result.ok_or_else(|| McpError::InvalidParams("missing result".to_string()))?,
        )?;
        Ok(result)
    }
}

fn exposed_name(server: &str, tool_name: &str) -> String {
    let stripped = tool_name.strip_prefix("mcp_").unwrap_or(tool_name);
    format!("mcp_{server}_{stripped}")
}

/// Splits `mcp_<server>_<tool>` back into `(server, tool)`, given the set of
/// known server names (needed because either half may itself contain `_`).
fn parse_exposed_name<'a>(exposed: &'a str, known_servers: &[String]) -> Option<(&'a str, &'a str)> {
    let rest = exposed.strip_prefix("mcp_")?;
    known_servers
        .iter()
        .filter(|s| rest.starts_with(s.as_str()))
        .max_by_key(|s| s.len())
        .and_then(|server| {
            rest.strip_prefix(server.as_str())
                .and_then(|r| r.strip_prefix('_'))
                .map(|tool| (server.as_str(), tool))
        })
}

struct ToolboxState {
    remotes: HashMap<String, Remote>,
}

/// Connects to every enabled MCP server and exposes their tools under
/// `mcp_<server>_<tool>` names.
pub struct McpToolbox {
    state: Mutex<ToolboxState>,
    server_names: Vec<String>,
}

impl McpToolbox {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ToolboxState {
                remotes: HashMap::new(),
            }),
            server_names: Vec::new(),
        }
    }

    /// Connect to every enabled server in `config`, discovering its tools.
    /// A single server failing to connect is logged and skipped rather than
    /// aborting the whole toolbox.
    pub async fn initialize(&mut self, config: &[McpServerConfig]) -> Result<(), McpError> {
        let mut state = self.state.lock().await;
        for server in config.iter().filter(|s| s.enabled) {
            let remote = match &server.transport {
                McpTransportConfig::Stdio { command, args } => {
                    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                    match McpClient::spawn(command, &arg_refs).await {
                        Ok(c) => Remote::Stdio(c),
                        Err(e) => {
                            tracing::warn!(server = %server.name, error = %e, "mcp server failed to connect");
                            continue;
                        }
                    }
                }
                McpTransportConfig::Sse { url } | McpTransportConfig::Http { url } => {
                    match HttpMcpClient::connect(url.clone()).await {
                        Ok(c) => Remote::Http(c),
                        Err(e) => {
                            tracing::warn!(server = %server.name, error = %e, "mcp server failed to connect");
                            continue;
                        }
                    }
                }
            };
            tracing::info!(server = %server.name, "mcp server connected");
            state.remotes.insert(server.name.clone(), remote);
            self.server_names.push(server.name.clone());
        }
        Ok(())
    }

    /// Flat list of tool schemas across every connected server, under their
    /// exposed `mcp_<server>_<tool>` names.
    pub async fn schemas(&self) -> Vec<ToolDefinition> {
        let state = self.state.lock().await;
        state
            .remotes
            .iter()
            .flat_map(|(server, remote)| {
                remote.tool_infos().into_iter().map(move |info| ToolDefinition {
                    name: exposed_name(server, &info.name),
                    description: info.description,
                    input_schema: info.input_schema,
                })
            })
            .collect()
    }

    pub fn has(&self, exposed_name: &str) -> bool {
        parse_exposed_name(exposed_name, &self.server_names).is_some()
    }

    /// Dispatch a call by its exposed name, routing to the owning server.
    pub async fn invoke(&self, exposed_name: &str, arguments: Value) -> Result<ToolResult, McpError> {
        let (server, tool_name) = parse_exposed_name(exposed_name, &self.server_names)
            .ok_or_else(|| McpError::ToolNotFound(exposed_name.to_string()))?;
        let state = self.state.lock().await;
        let remote = state
            .remotes
            .get(server)
            .ok_or_else(|| McpError::ServerUnavailable(server.to_string()))?;
        let result = remote.call_tool(tool_name, arguments).await?;
        let text = result
            .content
            .into_iter()
            .map(|c| match c {
                ToolContent::Text { text } => text,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(if result.is_error {
            ToolResult::failure(text)
        } else {
            ToolResult::success(text)
        })
    }

    /// Shut down every connection. Safe to call more than once.
    pub async fn cleanup(&mut self) {
        let mut state = self.state.lock().await;
        for (_, remote) in state.remotes.drain() {
            remote.shutdown().await;
        }
        self.server_names.clear();
    }
}

impl Default for McpToolbox {
    fn default() -> Self {
        Self::new()
    }
}

/// A single exposed MCP tool, suitable for registration in a `ToolRegistry`
/// alongside local tools. Holds the originating definition and a handle back
/// to the shared toolbox for dispatch.
pub struct McpToolboxTool {
    definition: ToolDefinition,
    toolbox: Arc<McpToolbox>,
}

impl McpToolboxTool {
    pub fn new(definition: ToolDefinition, toolbox: Arc<McpToolbox>) -> Self {
        Self { definition, toolbox }
    }
}

#[async_trait]
impl Tool for McpToolboxTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        self.toolbox
            .invoke(&self.definition.name, input)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposed_name_prefixes_server_and_tool() {
        assert_eq!(exposed_name("github", "create_issue"), "mcp_github_create_issue");
    }

    #[test]
    fn exposed_name_dedupes_preexisting_mcp_prefix() {
        assert_eq!(exposed_name("github", "mcp_create_issue"), "mcp_github_create_issue");
    }

    #[test]
    fn parse_exposed_name_roundtrips() {
        let servers = vec!["github".to_string()];
        let (server, tool) = parse_exposed_name("mcp_github_create_issue", &servers).unwrap();
        assert_eq!(server, "github");
        assert_eq!(tool, "create_issue");
    }

    #[test]
    fn parse_exposed_name_handles_underscored_tool_names() {
        let servers = vec!["my_server".to_string()];
        let (server, tool) = parse_exposed_name("mcp_my_server_list_files", &servers).unwrap();
        assert_eq!(server, "my_server");
        assert_eq!(tool, "list_files");
    }

    #[test]
    fn parse_exposed_name_rejects_unknown_server() {
        let servers = vec!["github".to_string()];
        assert!(parse_exposed_name("mcp_gitlab_create_issue", &servers).is_none());
    }
}
