use std::sync::Arc;

use stupid_agent::{Runner, SessionStore, TaskRegistry};
use stupid_core::config::Config;

/// Shared application state handed to every handler. Thin by design: all
/// the real work lives in `stupid-agent`'s `Runner`/`SessionStore`; this
/// crate only adapts them to HTTP/SSE request-response shapes (spec §1).
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub tasks: Arc<TaskRegistry>,
    pub runner: Runner,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionStore::new(&config.server.data_dir)?);
        let tasks = Arc::new(TaskRegistry::new());
        let runner = Runner::new(Arc::clone(&config), Arc::clone(&sessions), Arc::clone(&tasks));
        Ok(Self { config, sessions, tasks, runner })
    }
}
