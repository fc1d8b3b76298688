mod cli;
mod config;
mod server_client;
mod terminal;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tracing::{error, info};

use stupid_agent::{Runner, SessionStore, TaskRegistry};
use stupid_queue::stream::FROM_START;

use crate::cli::CliArgs;
use crate::config::CliConfig;
use crate::server_client::ServerClient;
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let terminal = Terminal::new();
    let config = CliConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    let server_url = args.server.clone().or_else(|| config.server_url.clone());

    if let Some(url) = server_url {
        run_remote(&url, &args, &terminal).await
    } else {
        run_local(&args, &config, &terminal).await
    }
}

/// Remote mode: the CLI is a thin client to a `stupid-server` (spec §4.9,
/// §6). Messages land on the server's session store and are visible to
/// anything else pointed at it (dashboard, other CLIs).
async fn run_remote(server_url: &str, args: &CliArgs, terminal: &Terminal) -> Result<()> {
    let client = ServerClient::new(server_url);

    client.health_check().await.with_context(|| format!("cannot connect to server at {server_url}"))?;
    terminal.print_info(&format!("Connected to server: {server_url}"))?;

    if args.list_sessions {
        let sessions = client.list_sessions().await?;
        terminal.print_sessions(&sessions)?;
        return Ok(());
    }

    let session_id = if let Some(ref id) = args.session {
        terminal.print_info(&format!("Using session: {id}"))?;
        id.clone()
    } else {
        let session = client.create_session().await?;
        terminal.print_info(&format!("Created session: {}", session.id))?;
        session.id
    };

    terminal.print_banner("remote", server_url)?;

    loop {
        let input = match terminal.read_input()? {
            Some(text) => text,
            None => {
                terminal.print_info("Goodbye.")?;
                break;
            }
        };
        if input.is_empty() {
            continue;
        }
        terminal.reset_cancel();

        let mut cursor = FROM_START.to_string();
        match client.chat(&session_id, Some(&input), None).await {
            Ok(mut events) => {
                while let Some(result) = events.next().await {
                    if terminal.is_cancelled() {
                        terminal.print_info("[cancelled]")?;
                        break;
                    }
                    match result {
                        Ok(event) => {
                            cursor = event.event_id;
                            terminal.display_event(&event.payload)?;
                        }
                        Err(e) => {
                            error!(error = %e, "chat stream error");
                            terminal.print_error(&format!("{e:#}"))?;
                            break;
                        }
                    }
                }
                let _ = cursor;
            }
            Err(e) => {
                error!(error = %e, "failed to start chat stream");
                terminal.print_error(&format!("{e:#}"))?;
            }
        }
    }

    terminal.print_info(&format!("Session: {session_id}"))?;
    Ok(())
}

/// Local mode: the CLI runs an in-process `Runner` against an on-disk
/// session store, the same agent stack `stupid-server` exposes over HTTP,
/// just driven directly instead of through the chat orchestrator.
async fn run_local(args: &CliArgs, cli_config: &CliConfig, terminal: &Terminal) -> Result<()> {
    let mut config = stupid_core::config::Config::from_env();
    config.server.data_dir = cli_config.data_dir.clone();
    if let Some(provider) = &args.provider {
        config.llm.provider = provider.clone();
    }
    config.llm.model = cli_config.resolve_model(&config.llm.provider, args.model.as_deref());
    config.llm.api_key = cli_config
        .resolve_api_key(&config.llm.provider, args.api_key.as_deref())
        .or(config.llm.api_key.clone());

    if !config.llm.is_configured() {
        anyhow::bail!(
            "no API key configured for provider '{}'. Set ANTHROPIC_API_KEY/OPENAI_API_KEY, pass --api-key, or edit the CLI config.",
            config.llm.provider
        );
    }

    let config = Arc::new(config);
    let sessions = Arc::new(SessionStore::new(&config.server.data_dir)?);
    let tasks = Arc::new(TaskRegistry::new());
    let runner = Runner::new(Arc::clone(&config), Arc::clone(&sessions), Arc::clone(&tasks));

    if args.list_sessions {
        terminal.print_sessions(&sessions.list()?)?;
        return Ok(());
    }

    let session = if let Some(ref id) = args.session {
        sessions.get(id)?.with_context(|| format!("no session found matching '{id}'"))?
    } else {
        let session = sessions.create()?;
        info!(session_id = %session.id, "created local session");
        session
    };

    terminal.print_banner("local", &format!("{}/{}", config.llm.provider, config.llm.model))?;

    loop {
        let input = match terminal.read_input()? {
            Some(text) => text,
            None => {
                terminal.print_info("Goodbye.")?;
                break;
            }
        };
        if input.is_empty() {
            continue;
        }
        terminal.reset_cancel();

        let spinner = terminal.start_spinner("thinking")?;
        let task = match runner.enqueue_chat(&session.id, stupid_agent::runner::ChatInput { message: input, attachments: vec![] }).await {
            Ok(task) => task,
            Err(e) => {
                spinner.stop();
                terminal.print_error(&format!("{e:#}"))?;
                continue;
            }
        };
        spinner.stop();

        let mut cursor = FROM_START.to_string();
        loop {
            if terminal.is_cancelled() {
                terminal.print_info("[cancelled]")?;
                break;
            }
            match task.output.tail(&cursor, std::time::Duration::from_secs(60)).await {
                Ok(Some(entry)) => {
                    cursor = entry.id.clone();
                    match serde_json::from_value::<stupid_agent::EventPayload>(entry.data) {
                        Ok(payload) => {
                            let terminal_event = payload.is_terminal();
                            terminal.display_event(&payload)?;
                            if terminal_event {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping malformed event");
                        }
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    terminal.print_error(&format!("{e:#}"))?;
                    break;
                }
            }
        }
    }

    terminal.print_info(&format!("Session: {}", session.id))?;
    Ok(())
}
