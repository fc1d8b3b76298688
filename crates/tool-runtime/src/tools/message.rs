//! The `message_ask_user` tool.
//!
//! Unlike every other tool here, this one never talks to a sandbox: calling
//! it is a signal, not an action. The agent loop special-cases this tool
//! name and pauses the session instead of invoking `execute` — this
//! implementation exists so the tool still shows up in the registry's
//! listing and schema, and so anything that *does* call it directly (tests,
//! the CLI's local loop) gets a sane, non-erroring result.

use async_trait::async_trait;
use serde_json::Value;

use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "message_ask_user".to_string(),
            description:
                "Ask the user a question or request input before continuing. Pauses the session \
                 until the user replies."
                    .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "The question or message for the user" },
                    "attachments": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional sandbox file paths to share with the user"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let text = input
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'text' field".to_string()))?;
        Ok(ToolResult::success(text.to_string()))
    }
}
