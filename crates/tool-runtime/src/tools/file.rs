//! File tools backed by a remote sandbox session rather than the local OS.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stupid_sandbox::SandboxSession;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

fn to_tool_result(r: stupid_sandbox::SandboxResult) -> ToolResult {
    let mut result = if r.success {
        ToolResult::success(r.as_text())
    } else {
        ToolResult::failure(r.as_text())
    };
    result.data = r.data.clone();
    result
}

fn require_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidInput(format!("missing '{field}' field")))
}

pub struct FileReadTool {
    sandbox: Arc<SandboxSession>,
}

impl FileReadTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_read".to_string(),
            description: "Read a file's contents from the sandbox filesystem.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "start_line": { "type": "integer" },
                    "end_line": { "type": "integer" },
                    "sudo": { "type": "boolean" },
                    "max_length": { "type": "integer", "description": "Max bytes to return" }
                },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let start_line = input.get("start_line").and_then(|v| v.as_u64()).map(|v| v as u32);
        let end_line = input.get("end_line").and_then(|v| v.as_u64()).map(|v| v as u32);
        let sudo = input.get("sudo").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_length = input
            .get("max_length")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(10_000);

        let result = self
            .sandbox
            .file_read(file_path, start_line, end_line, sudo, max_length)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileWriteTool {
    sandbox: Arc<SandboxSession>,
}

impl FileWriteTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_write".to_string(),
            description: "Write or append content to a file in the sandbox filesystem.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "content": { "type": "string" },
                    "append": { "type": "boolean" },
                    "leading_newline": { "type": "boolean" },
                    "trailing_newline": { "type": "boolean" },
                    "sudo": { "type": "boolean" }
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let content = require_str(&input, "content")?;
        let append = input.get("append").and_then(|v| v.as_bool()).unwrap_or(false);
        let leading_newline = input.get("leading_newline").and_then(|v| v.as_bool()).unwrap_or(false);
        let trailing_newline = input.get("trailing_newline").and_then(|v| v.as_bool()).unwrap_or(true);
        let sudo = input.get("sudo").and_then(|v| v.as_bool()).unwrap_or(false);

        let result = self
            .sandbox
            .file_write(file_path, content, append, leading_newline, trailing_newline, sudo)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileReplaceTool {
    sandbox: Arc<SandboxSession>,
}

impl FileReplaceTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReplaceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_replace".to_string(),
            description: "Replace the first match of old_text with new_text in a file.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "old_text": { "type": "string" },
                    "new_text": { "type": "string" },
                    "sudo": { "type": "boolean" }
                },
                "required": ["file_path", "old_text", "new_text"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let old_text = require_str(&input, "old_text")?;
        let new_text = require_str(&input, "new_text")?;
        let sudo = input.get("sudo").and_then(|v| v.as_bool()).unwrap_or(false);

        let result = self
            .sandbox
            .file_replace(file_path, old_text, new_text, sudo)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileSearchTool {
    sandbox: Arc<SandboxSession>,
}

impl FileSearchTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_search".to_string(),
            description: "Search a file for lines matching a regex.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "regex": { "type": "string" },
                    "sudo": { "type": "boolean" }
                },
                "required": ["file_path", "regex"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let regex = require_str(&input, "regex")?;
        let sudo = input.get("sudo").and_then(|v| v.as_bool()).unwrap_or(false);

        let result = self
            .sandbox
            .file_search(file_path, regex, sudo)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileFindTool {
    sandbox: Arc<SandboxSession>,
}

impl FileFindTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileFindTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_find".to_string(),
            description: "Find files under a directory matching a glob pattern.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "dir_path": { "type": "string" },
                    "glob_pattern": { "type": "string" }
                },
                "required": ["dir_path", "glob_pattern"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let dir_path = require_str(&input, "dir_path")?;
        let glob_pattern = require_str(&input, "glob_pattern")?;

        let result = self
            .sandbox
            .file_find(dir_path, glob_pattern)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileExistsTool {
    sandbox: Arc<SandboxSession>,
}

impl FileExistsTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileExistsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_exists".to_string(),
            description: "Check whether a path exists in the sandbox filesystem.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "file_path": { "type": "string" } },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let result = self
            .sandbox
            .file_exists(file_path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct FileDeleteTool {
    sandbox: Arc<SandboxSession>,
}

impl FileDeleteTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileDeleteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "file_delete".to_string(),
            description: "Delete a file from the sandbox filesystem.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "file_path": { "type": "string" } },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let file_path = require_str(&input, "file_path")?;
        let result = self
            .sandbox
            .file_delete(file_path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}
