//! Browser tools backed by the headless browser inside a sandbox session.
//!
//! Interactive calls accept either an `index` from the last view/navigate
//! response or raw pixel coordinates, never both — mirroring
//! `stupid_sandbox::Browser`'s own contract.

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

fn index_and_coords(input: &Value) -> (Option<u32>, Option<f64>, Option<f64>) {
    let index = input.get("index").and_then(|v| v.as_u64()).map(|v| v as u32);
    let x = input.get("coordinate_x").and_then(|v| v.as_f64());
    let y = input.get("coordinate_y").and_then(|v| v.as_f64());
    (index, x, y)
}

pub struct BrowserViewTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserViewTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserViewTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_view".to_string(),
            description: "View the current state of the browser page, including interactive elements.".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let result = self
            .sandbox
            .browser()
            .view_page()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct BrowserNavigateTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserNavigateTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserNavigateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_navigate".to_string(),
            description: "Navigate the browser to a URL.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let url = input
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'url' field".to_string()))?;
        let result = self
            .sandbox
            .browser()
            .navigate(url)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct BrowserClickTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserClickTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserClickTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_click".to_string(),
            description: "Click an interactive element by index, or a raw pixel coordinate.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "index": { "type": "integer" },
                    "coordinate_x": { "type": "number" },
                    "coordinate_y": { "type": "number" }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let (index, x, y) = index_and_coords(&input);
        let result = self
            .sandbox
            .browser()
            .click(index, x, y)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct BrowserInputTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserInputTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserInputTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_input".to_string(),
            description: "Type text into an interactive element by index, or a raw pixel coordinate.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "press_enter": { "type": "boolean" },
                    "index": { "type": "integer" },
                    "coordinate_x": { "type": "number" },
                    "coordinate_y": { "type": "number" }
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
        let press_enter = input.get("press_enter").and_then(|v| v.as_bool()).unwrap_or(false);
        let (index, x, y) = index_and_coords(&input);
        let result = self
            .sandbox
            .browser()
            .input(text, press_enter, index, x, y)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct BrowserScrollTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserScrollTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserScrollTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_scroll".to_string(),
            description: "Scroll the browser page up or down.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "direction": { "type": "string", "enum": ["up", "down"] },
                    "to_edge": { "type": "boolean", "description": "Scroll all the way to the top/bottom" }
                },
                "required": ["direction"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let direction = input
            .get("direction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'direction' field".to_string()))?;
        let to_edge = input.get("to_edge").and_then(|v| v.as_bool());
        let browser = self.sandbox.browser();
        let result = match direction {
            "up" => browser.scroll_up(to_edge).await,
            "down" => browser.scroll_down(to_edge).await,
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "invalid 'direction': {other} (expected 'up' or 'down')"
                )))
            }
        }
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(to_tool_result(result))
    }
}

pub struct BrowserScreenshotTool {
    sandbox: Arc<SandboxSession>,
}

impl BrowserScreenshotTool {
    pub fn new(sandbox: Arc<SandboxSession>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for BrowserScreenshotTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browser_screenshot".to_string(),
            description: "Capture a screenshot of the current browser page, base64-encoded.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "full_page": { "type": "boolean" } }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let full_page = input.get("full_page").and_then(|v| v.as_bool());
        let bytes = self
            .sandbox
            .browser()
            .screenshot(full_page)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(ToolResult::success("screenshot captured").with_data(serde_json::json!({
            "image_base64": encoded,
            "media_type": "image/png",
        })))
    }
}
