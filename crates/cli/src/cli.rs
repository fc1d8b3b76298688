use clap::Parser;

/// Interactive client for the agent runtime.
///
/// Runs a local Runner against an on-disk session store, or — with
/// `--server` — becomes a thin client to a running `stupid-server`,
/// sharing its sessions with any dashboard pointed at the same server.
#[derive(Parser, Debug)]
#[command(name = "stupid-cli", about = "Interactive client for the agent runtime")]
pub struct CliArgs {
    /// LLM provider override: anthropic or openai (local mode only)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name override (local mode only)
    #[arg(long)]
    pub model: Option<String>,

    /// API key override (local mode only)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Path to the CLI config file (default: ~/.config/stupid-cli/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Resume a previous session by id
    #[arg(long)]
    pub session: Option<String>,

    /// List all sessions and exit
    #[arg(long)]
    pub list_sessions: bool,

    /// Server URL for remote mode. When set, the CLI becomes a thin client —
    /// sessions and events are visible to anything else pointed at the server.
    #[arg(long)]
    pub server: Option<String>,
}
