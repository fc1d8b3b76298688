use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by every sandbox-side command and file operation.
///
/// Mirrors the sandbox wire API: an HTTP status code below 300 maps to
/// `success: true`, the human-readable `message` carries stdout/stderr or a
/// short status line, and `data` carries any structured payload (directory
/// listings, search matches, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl SandboxResult {
    pub fn from_sandbox(code: u16, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: code < 300,
            message: Some(message.into()),
            data,
        }
    }

    /// Render as the single text blob a `ToolResult` expects.
    pub fn as_text(&self) -> String {
        match (&self.message, &self.data) {
            (Some(m), None) => m.clone(),
            (Some(m), Some(d)) => format!("{m}\n{d}"),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        }
    }
}
