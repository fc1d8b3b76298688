//! Shell tools backed by a remote sandbox session rather than the local OS.
//!
//! Each tool maps to one `SandboxSession` shell method; `session_id` lets the
//! model multiplex several named terminals inside the same sandbox and
//! defaults to `"default"` when the model omits it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stupid_sandbox::SandboxSession;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

fn session_id(input: &Value) -> String {
    input
        .get("session_id")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string()
}

fn to_tool_result(r: stupid_sandbox::SandboxResult) -> ToolResult {
    let mut result = if r.success {
        ToolResult::success(r.as_text())
    } else {
        ToolResult::failure(r.as_text())
    };
    result.data = r.data.clone();
    result
}

pub struct ShellExecTool {
    sandbox: Arc<SandboxSession>,
}

impl ShellExecTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell_exec".to_string(),
            description: "Execute a shell command inside the sandbox.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "The shell command to run" },
                    "exec_dir": { "type": "string", "description": "Working directory for the command" },
                    "session_id": { "type": "string", "description": "Named terminal to run in (default 'default')" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'command' field".to_string()))?;
        let exec_dir = input
            .get("exec_dir")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| context.working_directory.display().to_string());

        let result = self
            .sandbox
            .exec_command(&session_id(&input), &exec_dir, command)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct ShellViewTool {
    sandbox: Arc<SandboxSession>,
}

impl ShellViewTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell_view".to_string(),
            description: "View the output of a running or completed shell session.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "console": { "type": "boolean", "description": "Return raw console output" }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let console = input.get("console").and_then(|v| v.as_bool()).unwrap_or(false);
        let result = self
            .sandbox
            .view_shell(&session_id(&input), console)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct ShellWaitTool {
    sandbox: Arc<SandboxSession>,
}

impl ShellWaitTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellWaitTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell_wait".to_string(),
            description: "Wait for the running process in a shell session to finish.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "seconds": { "type": "number", "description": "Max seconds to wait" }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let seconds = input.get("seconds").and_then(|v| v.as_u64()).map(|s| s as u32);
        let result = self
            .sandbox
            .wait_for_process(&session_id(&input), seconds)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct ShellWriteTool {
    sandbox: Arc<SandboxSession>,
}

impl ShellWriteTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellWriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell_write".to_string(),
            description: "Write input to a running process's stdin, e.g. to answer a prompt.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "input_text": { "type": "string" },
                    "press_enter": { "type": "boolean" }
                },
                "required": ["input_text"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let input_text = input
            .get("input_text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'input_text' field".to_string()))?;
        let press_enter = input.get("press_enter").and_then(|v| v.as_bool()).unwrap_or(true);
        let result = self
            .sandbox
            .write_to_process(&session_id(&input), input_text, press_enter)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct ShellKillTool {
    sandbox: Arc<SandboxSession>,
}

impl ShellKillTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ShellKillTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shell_kill".to_string(),
            description: "Kill the running process in a shell session.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "session_id": { "type": "string" } }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let result = self
            .sandbox
            .kill_process(&session_id(&input))
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}
