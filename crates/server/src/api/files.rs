//! File listing and read-through (spec §6: `GET /sessions/{id}/files`,
//! `POST /sessions/{id}/file`). Thin proxy over the session's sandbox.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use stupid_agent::File;
use stupid_sandbox::SandboxSession;

use crate::error::ApiError;
use crate::state::AppState;

#[utoipa::path(get, path = "/sessions/{id}/files", tag = "Files", responses((status = 200)))]
pub async fn list_files(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Vec<File>>, ApiError> {
    let session = state.sessions.get(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    Ok(Json(session.files))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct FileReadRequest {
    pub path: String,
    #[serde(default)]
    pub privileged: bool,
}

/// Reads a sandbox file for display. Missing path without `privileged` is a
/// typed not-found error (spec §4.2); with `privileged` set, the sandbox
/// uses its elevated path instead (spec §9, "privileged file ops").
#[utoipa::path(post, path = "/sessions/{id}/file", tag = "Files", responses((status = 200)))]
pub async fn read_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<FileReadRequest>,
) -> Result<String, ApiError> {
    let session = state.sessions.get(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    let sandbox_id = session.sandbox_id.ok_or_else(|| ApiError::not_found("session has no sandbox yet".to_string()))?;
    let sandbox = SandboxSession::get(&sandbox_id, &state.config.sandbox).await?;
    let result = sandbox.file_read(&req.path, None, None, req.privileged, u32::MAX).await?;
    if !result.success {
        return Err(ApiError::not_found(result.message.unwrap_or_else(|| "file not found".to_string())));
    }
    Ok(result.as_text())
}
