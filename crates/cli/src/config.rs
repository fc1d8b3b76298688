use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// CLI-specific settings loaded from TOML. Everything the agent runtime
/// itself needs (LLM, sandbox, MCP, ...) comes from `stupid_core::Config`
/// instead — this file only covers the things the CLI binary owns: where
/// local sessions live and which server to talk to by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default LLM provider name (anthropic, openai) for local mode.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model per provider, for local mode.
    #[serde(default)]
    pub default_models: HashMap<String, String>,

    /// API keys keyed by provider name, for local mode.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    /// Default server URL for remote mode.
    #[serde(default)]
    pub server_url: Option<String>,

    /// Local data directory (sessions, sandboxes) for local mode.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_models: HashMap::new(),
            api_keys: HashMap::new(),
            server_url: None,
            data_dir: default_data_dir(),
        }
    }
}

impl CliConfig {
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("stupid-cli");
        Ok(config_dir)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path. Returns
    /// defaults (writing them out) if no file exists yet.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "loading cli config");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
            Ok(config)
        } else {
            debug!(?config_path, "cli config not found, using defaults");
            let config = Self::default();
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let toml_str = toml::to_string_pretty(&config).context("failed to serialize default config")?;
            std::fs::write(&config_path, toml_str).ok();
            Ok(config)
        }
    }

    /// Resolve an API key for the given provider.
    /// Priority: cli_override > env var > config file.
    pub fn resolve_api_key(&self, provider: &str, cli_override: Option<&str>) -> Option<String> {
        if let Some(key) = cli_override {
            return Some(key.to_string());
        }
        let env_var = match provider {
            "claude" | "anthropic" => "ANTHROPIC_API_KEY",
            "openai" => "OPENAI_API_KEY",
            _ => return self.api_keys.get(provider).cloned(),
        };
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
        self.api_keys.get(provider).cloned()
    }

    /// Resolve the model name for a provider.
    /// Priority: cli_override > config file > provider default.
    pub fn resolve_model(&self, provider: &str, cli_override: Option<&str>) -> String {
        if let Some(model) = cli_override {
            return model.to_string();
        }
        if let Some(model) = self.default_models.get(provider) {
            return model.clone();
        }
        match provider {
            "claude" | "anthropic" => "claude-sonnet-4-20250514".to_string(),
            "openai" => "gpt-4o".to_string(),
            _ => "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CliConfig::default();
        assert_eq!(config.default_provider, "anthropic");
    }

    #[test]
    fn resolve_model_defaults() {
        let config = CliConfig::default();
        assert!(config.resolve_model("anthropic", None).contains("claude"));
        assert!(config.resolve_model("openai", None).contains("gpt"));
    }

    #[test]
    fn resolve_model_override() {
        let config = CliConfig::default();
        assert_eq!(
            config.resolve_model("anthropic", Some("claude-opus-4-20250514")),
            "claude-opus-4-20250514"
        );
    }

    #[test]
    fn resolve_api_key_from_config() {
        let mut config = CliConfig::default();
        config.api_keys.insert("custom-provider".to_string(), "sk-test-123".to_string());
        assert_eq!(config.resolve_api_key("custom-provider", None), Some("sk-test-123".to_string()));
    }

    #[test]
    fn resolve_api_key_cli_override() {
        let config = CliConfig::default();
        assert_eq!(config.resolve_api_key("anthropic", Some("cli-key")), Some("cli-key".to_string()));
    }

    #[test]
    fn toml_roundtrip() {
        let config = CliConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
    }
}
