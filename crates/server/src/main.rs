use std::sync::Arc;

use tracing::info;

use stupid_server::state::AppState;

fn load_config() -> stupid_core::config::Config {
    stupid_core::config::load_dotenv();
    let yaml_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    stupid_core::config::Config::load(Some(std::path::Path::new(&yaml_path)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = load_config();
    config.log_summary();

    let state = Arc::new(AppState::new(config.clone())?);
    let app = stupid_server::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
