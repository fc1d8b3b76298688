pub mod claude_tool_provider;
pub mod openai_tool_provider;

use stupid_core::config::LlmConfig;
use stupid_tool_runtime::provider::{LlmError, ToolAwareLlmProvider};

pub use claude_tool_provider::ClaudeToolProvider;
pub use openai_tool_provider::OpenAiToolProvider;

/// Build the configured [`ToolAwareLlmProvider`] from [`LlmConfig`].
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn ToolAwareLlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" | "claude" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| LlmError::Other(anyhow::anyhow!("LLM api_key not set for anthropic provider")))?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string());
            Ok(Box::new(ClaudeToolProvider::new(
                api_key,
                config.model.clone(),
                base_url,
            )))
        }
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| LlmError::Other(anyhow::anyhow!("LLM api_key not set for openai provider")))?;
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            Ok(Box::new(OpenAiToolProvider::new(
                api_key,
                config.model.clone(),
                base_url,
            )))
        }
        other => Err(LlmError::Other(anyhow::anyhow!(
            "unknown LLM provider: '{other}'"
        ))),
    }
}
