//! A2A (Agent-to-Agent) toolbox: lets the agent call other agents.
//!
//! On `initialize`, fetches each configured server's
//! `/.well-known/agent-card.json` and keeps it keyed by server id.
//! `call_remote_agent` posts a JSON-RPC `message/send` envelope: a request
//! whose `params.message` carries `{role, parts: [{type: "text", text}],
//! messageId}`, and whose `result` carries the remote agent's reply parts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stupid_tool_runtime::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

use stupid_core::config::A2aServerConfig;

use crate::error::McpError;
use crate::types::{JsonRpcRequest, JsonRpcResponse, RpcId};

/// A remote agent's published card, fetched from its well-known endpoint.
/// Fields beyond `name`/`description` vary by implementation and are kept
/// as a raw JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessagePart {
    #[serde(rename = "type")]
    kind: String,
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct A2aMessage {
    role: String,
    parts: Vec<MessagePart>,
    #[serde(rename = "messageId")]
    message_id: String,
}

pub struct A2aToolbox {
    client: reqwest::Client,
    servers: HashMap<String, A2aServerConfig>,
    cards: HashMap<String, AgentCard>,
}

impl A2aToolbox {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            servers: HashMap::new(),
            cards: HashMap::new(),
        }
    }

    /// Fetch every configured server's agent card. A server whose card
    /// cannot be fetched is skipped with a warning, not a hard failure.
    pub async fn initialize(&mut self, config: &[A2aServerConfig]) -> Result<(), McpError> {
        for server in config {
            let url = format!(
                "{}/.well-known/agent-card.json",
                server.base_url.trim_end_matches('/')
            );
            match self.client.get(&url).send().await {
                Ok(resp) => match resp.json::<AgentCard>().await {
                    Ok(card) => {
                        self.cards.insert(server.name.clone(), card);
                        self.servers.insert(server.name.clone(), server.clone());
                    }
                    Err(e) => {
                        tracing::warn!(server = %server.name, error = %e, "invalid a2a agent card");
                    }
                },
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "a2a agent card fetch failed");
                }
            }
        }
        Ok(())
    }

    /// Cards for every server that answered during `initialize`.
    pub fn get_remote_agent_cards(&self) -> Vec<(&str, &AgentCard)> {
        self.cards.iter().map(|(id, card)| (id.as_str(), card)).collect()
    }

    /// Post a JSON-RPC `message/send` to the named remote agent and return
    /// its reply text, concatenating every text part in the result.
    pub async fn call_remote_agent(&self, id: &str, query: &str) -> Result<String, McpError> {
        let server = self
            .servers
            .get(id)
            .ok_or_else(|| McpError::ServerUnavailable(id.to_string()))?;

        let message = A2aMessage {
            role: "user".to_string(),
            parts: vec![MessagePart {
                kind: "text".to_string(),
                text: query.to_string(),
            }],
            message_id: uuid::Uuid::new_v4().to_string(),
        };
        let request = JsonRpcRequest::new(
            RpcId::String(uuid::Uuid::new_v4().to_string()),
            "message/send",
            Some(serde_json::json!({ "message": message })),
        );

        let resp = self
            .client
            .post(&server.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| McpError::ServerUnavailable(e.to_string()))?;
        let response: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| McpError::ServerUnavailable(e.to_string()))?;

        if let Some(err) = response.error {
            return Err(McpError::ToolExecution(err.message));
        }
        let result = response
            .result
            .ok_or_else(|| McpError::InvalidParams("missing result".to_string()))?;

        let reply = result
            .get("message")
            .and_then(|m| m.get("parts"))
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        Ok(reply)
    }

    pub fn cleanup(&mut self) {
        self.cards.clear();
        self.servers.clear();
    }
}

impl Default for A2aToolbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Lists the remote agents discovered during `initialize`, so the agent
/// loop can learn what's reachable without hardcoding server ids. Named
/// analogously to `McpToolboxTool` but, unlike MCP's one tool per remote
/// capability, A2A exposes a fixed pair of tools since a remote agent has
/// no per-operation schema to mirror.
pub struct A2aListAgentsTool {
    toolbox: Arc<A2aToolbox>,
}

impl A2aListAgentsTool {
    pub fn new(toolbox: Arc<A2aToolbox>) -> Self {
        Self { toolbox }
    }
}

#[async_trait]
impl Tool for A2aListAgentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "a2a_list_agents".to_string(),
            description: "List remote agents reachable over A2A, with their published agent cards.".to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let cards = self.toolbox.get_remote_agent_cards();
        let summary: Vec<Value> = cards
            .into_iter()
            .map(|(id, card)| serde_json::json!({"id": id, "name": card.name, "description": card.description}))
            .collect();
        Ok(ToolResult::success(serde_json::to_string(&summary).unwrap_or_default()))
    }
}

/// Sends one message to a remote agent and returns its reply text.
pub struct A2aCallAgentTool {
    toolbox: Arc<A2aToolbox>,
}

impl A2aCallAgentTool {
    pub fn new(toolbox: Arc<A2aToolbox>) -> Self {
        Self { toolbox }
    }
}

#[async_trait]
impl Tool for A2aCallAgentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "a2a_call_agent".to_string(),
            description: "Send a message to a remote agent discovered via a2a_list_agents and return its reply.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string"},
                    "query": {"type": "string"}
                },
                "required": ["agent_id", "query"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let agent_id = input.get("agent_id").and_then(|v| v.as_str()).ok_or_else(|| ToolError::InvalidInput("missing agent_id".to_string()))?;
        let query = input.get("query").and_then(|v| v.as_str()).ok_or_else(|| ToolError::InvalidInput("missing query".to_string()))?;
        match self.toolbox.call_remote_agent(agent_id, query).await {
            Ok(reply) => Ok(ToolResult::success(reply)),
            Err(e) => Ok(ToolResult::failure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_card_deserializes_with_extra_fields() {
        let json = serde_json::json!({
            "name": "translator",
            "description": "translates text",
            "url": "https://example.com/a2a",
            "version": "1.0"
        });
        let card: AgentCard = serde_json::from_value(json).unwrap();
        assert_eq!(card.name, "translator");
    }
}
