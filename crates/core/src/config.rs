use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn clamp(v: u32, lo: u32, hi: u32) -> u32 {
    v.clamp(lo, hi)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub a2a_servers: Vec<A2aServerConfig>,
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

impl Config {
    /// Build config from a YAML file (if present) overlaid with environment
    /// variables. Env vars win over the file, the file wins over defaults —
    /// the same precedence direction as the teacher's profiled-env scheme,
    /// collapsed to a two-source (file, env) chain.
    pub fn load(yaml_path: Option<&Path>) -> Self {
        let mut cfg = yaml_path
            .filter(|p| p.exists())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_yaml::from_str::<Config>(&s).ok())
            .unwrap_or_default();
        cfg.apply_env_overrides();
        cfg
    }

    pub fn from_env() -> Self {
        Self::load(None)
    }

    fn apply_env_overrides(&mut self) {
        self.server.apply_env();
        self.llm.apply_env();
        self.agent.apply_env();
        self.sandbox.apply_env();
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "server": { "host": self.server.host, "port": self.server.port },
            "llm": { "provider": self.llm.provider, "model": self.llm.model, "configured": self.llm.is_configured() },
            "agent": {
                "max_iterations": self.agent.max_iterations,
                "max_retries": self.agent.max_retries,
                "max_search_results": self.agent.max_search_results,
            },
            "mcp_servers": self.mcp_servers.iter().map(|s| &s.name).collect::<Vec<_>>(),
            "a2a_servers": self.a2a_servers.iter().map(|s| &s.name).collect::<Vec<_>>(),
        })
    }

    pub fn log_summary(&self) {
        tracing::info!(
            host = %self.server.host,
            port = self.server.port,
            llm_provider = %self.llm.provider,
            mcp_servers = self.mcp_servers.len(),
            a2a_servers = self.a2a_servers.len(),
            "config loaded"
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origin: "*".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ServerConfig {
    fn apply_env(&mut self) {
        if let Some(v) = env_opt("HOST") {
            self.host = v;
        }
        self.port = env_opt("PORT").and_then(|v| v.parse().ok()).unwrap_or(self.port);
        if let Some(v) = env_opt("CORS_ORIGIN") {
            self.cors_origin = v;
        }
        if let Some(v) = env_opt("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama"
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            base_url: None,
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

impl LlmConfig {
    fn apply_env(&mut self) {
        if let Some(v) = env_opt("LLM_PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = env_opt("LLM_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = env_opt("LLM_MODEL") {
            self.model = v;
        }
        if let Some(v) = env_opt("LLM_BASE_URL") {
            self.base_url = Some(v);
        }
        self.temperature = env_f32("LLM_TEMPERATURE", self.temperature);
        self.max_tokens = env_u32("LLM_MAX_TOKENS", self.max_tokens);
    }

    pub fn is_configured(&self) -> bool {
        self.provider == "ollama" || self.api_key.is_some()
    }
}

// ── Agent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub max_retries: u32,
    pub max_search_results: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 30, max_retries: 3, max_search_results: 5 }
    }
}

impl AgentConfig {
    fn apply_env(&mut self) {
        self.max_iterations = clamp(env_u32("AGENT_MAX_ITERATIONS", self.max_iterations), 1, 999);
        self.max_retries = clamp(env_u32("AGENT_MAX_RETRIES", self.max_retries), 2, 9);
        self.max_search_results = clamp(env_u32("AGENT_MAX_SEARCH_RESULTS", self.max_search_results), 2, 29);
    }
}

// ── MCP / A2A ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub transport: McpTransportConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum McpTransportConfig {
    Stdio { command: String, #[serde(default)] args: Vec<String> },
    Sse { url: String },
    Http { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aServerConfig {
    pub name: String,
    pub base_url: String,
}

fn default_true() -> bool {
    true
}

// ── Sandbox ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Pre-configured shared endpoint, if the sandbox is not self-provisioned.
    pub shared_endpoint: Option<String>,
    /// Container image to provision a fresh sandbox from, if no shared endpoint is set.
    pub image: String,
    pub ready_poll_attempts: u32,
    pub ready_poll_interval_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shared_endpoint: None,
            image: "stupid-sandbox:latest".to_string(),
            ready_poll_attempts: 30,
            ready_poll_interval_secs: 2,
        }
    }
}

impl SandboxConfig {
    fn apply_env(&mut self) {
        if let Some(v) = env_opt("SANDBOX_ENDPOINT") {
            self.shared_endpoint = Some(v);
        }
        if let Some(v) = env_opt("SANDBOX_IMAGE") {
            self.image = v;
        }
    }
}

// ── Search ────────────────────────────────────────────────────

/// Pluggable web-search backend endpoint (spec §4.3's `search_web` tool).
/// Absent means the tool is simply not registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}
