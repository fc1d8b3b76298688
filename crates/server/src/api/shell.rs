//! Shell session output read-through (spec §6: `POST /sessions/{id}/shell`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use stupid_sandbox::SandboxSession;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShellOutputRequest {
    pub shell_session_id: String,
    #[serde(default)]
    pub include_console: bool,
}

#[utoipa::path(post, path = "/sessions/{id}/shell", tag = "Shell", responses((status = 200)))]
pub async fn shell_output(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ShellOutputRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    let sandbox_id = session.sandbox_id.ok_or_else(|| ApiError::not_found("session has no sandbox yet".to_string()))?;
    let sandbox = SandboxSession::get(&sandbox_id, &state.config.sandbox).await?;
    let result = sandbox.view_shell(&req.shell_session_id, req.include_console).await?;
    Ok(Json(serde_json::to_value(result).map_err(|e| ApiError::server(e.to_string()))?))
}
