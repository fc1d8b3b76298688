//! MCP (Model Context Protocol) and A2A client toolboxes.
//!
//! This crate only implements the *client* side: consuming tools exposed by
//! remote MCP servers (stdio/SSE/HTTP) and remote agents over A2A's
//! JSON-RPC `message/send` envelope. Both are wrapped as `Tool` impls
//! (`McpToolboxTool`, `A2aCallAgentTool`/`A2aListAgentsTool`) so the agent's
//! tool registry sees them like any other tool.
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **client**: MCP client connecting to server subprocesses/endpoints
//! - **toolbox**: per-session MCP/A2A toolboxes built from `McpServerConfig`
//! - **a2a**: agent-to-agent client and its toolbox wrapper
//! - **error**: Unified error types

pub mod a2a;
pub mod types;
pub mod client;
pub mod error;
pub mod toolbox;

pub use a2a::{A2aCallAgentTool, A2aListAgentsTool, A2aToolbox, AgentCard};
pub use types::*;
pub use client::{McpClient, McpTool};
pub use error::McpError;
pub use toolbox::{McpToolbox, McpToolboxTool};
