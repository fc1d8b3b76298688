//! Session CRUD and the chat orchestrator (spec §4.9, C12).
//!
//! Everything here is deliberately thin per spec §1 ("thin HTTP/WebSocket
//! handlers... specified only at their interface"): request/response shapes
//! and SSE framing live in this module; all state transitions and event
//! production happen in `stupid_agent::Runner`/`SessionStore`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tracing::warn;

use stupid_agent::runner::ChatInput;
use stupid_agent::{EventPayload, File, SessionSummary};
use stupid_queue::stream::FROM_START;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateSessionRequest {}

#[utoipa::path(post, path = "/sessions", tag = "Sessions", responses((status = 200)))]
pub async fn create_session(State(state): State<Arc<AppState>>) -> Result<Json<SessionSummary>, ApiError> {
    let session = state.sessions.create()?;
    Ok(Json(SessionSummary::from(&session)))
}

#[utoipa::path(get, path = "/sessions", tag = "Sessions", responses((status = 200)))]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    Ok(Json(state.sessions.list()?))
}

/// `POST /sessions/stream`: same listing, pushed every ~5s until the client
/// disconnects (spec §6, open question in §9: cadence left to the
/// implementer, ≈5s in the source).
pub async fn list_sessions_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(state, |state| async move {
        let snapshot = state.sessions.list().unwrap_or_default();
        let data = serde_json::to_string(&snapshot).unwrap_or_default();
        tokio::time::sleep(Duration::from_secs(5)).await;
        Some((Ok(Event::default().event("sessions").data(data)), state))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(get, path = "/sessions/{id}", tag = "Sessions", responses((status = 200), (status = 404)))]
pub async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    Ok(Json(session))
}

#[utoipa::path(post, path = "/sessions/{id}/delete", tag = "Sessions", responses((status = 200)))]
pub async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.runner.cancel(&id);
    state.sessions.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/sessions/{id}/stop", tag = "Sessions", responses((status = 200)))]
pub async fn stop_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<SessionSummary>, ApiError> {
    state.runner.cancel(&id);
    let session = state
        .sessions
        .set_status(&id, stupid_agent::SessionStatus::Completed)?
        .ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    Ok(Json(SessionSummary::from(&session)))
}

#[utoipa::path(post, path = "/sessions/{id}/clear-unread-message-count", tag = "Sessions", responses((status = 200)))]
pub async fn clear_unread(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<SessionSummary>, ApiError> {
    let session = state.sessions.clear_unread(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;
    Ok(Json(SessionSummary::from(&session)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<File>,
    /// Client resume cursor (spec §4.9 step 4, §6). `None`/absent means
    /// "from the beginning of this stream instance".
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// `POST /sessions/{id}/chat`: the chat orchestrator (spec §4.9).
#[utoipa::path(post, path = "/sessions/{id}/chat", tag = "Sessions", responses((status = 200)))]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Step 1: load session, 404 if missing.
    state.sessions.get(&id)?.ok_or_else(|| ApiError::not_found(format!("session {id} not found")))?;

    // Step 2: determine the current task, creating one only if a message
    // was supplied and nothing is already running (spec §4.9 step 2).
    let existing_task = state.tasks.get(&id).filter(|t| !t.done());

    let task = if let Some(message) = req.message.clone() {
        // Step 3: latest_message/timestamp, then enqueue + persist the
        // user's own turn as a `message{role=user}` event so SSE clients
        // (and the persisted history) see it alongside assistant output.
        state.sessions.set_latest_message(&id, &message)?;
        let task = state
            .runner
            .enqueue_chat(&id, ChatInput { message: message.clone(), attachments: req.attachments.clone() })
            .await?;
        let payload = EventPayload::Message {
            role: stupid_agent::event::MessageRole::User,
            message,
            attachments: req.attachments,
        };
        let event_id = task.output.put(serde_json::to_value(&payload).unwrap()).await?;
        state.sessions.append_event(&id, event_id, chrono::Utc::now(), payload)?;
        Some(task)
    } else {
        existing_task
    };

    let resume_after = req.event_id.unwrap_or_else(|| FROM_START.to_string());

    // Step 6: "finally", schedule an unread-count reset. The reset itself
    // runs on a detached worker (spawned from `Drop`, below) so client
    // disconnect can't cancel the write, but it must not fire until the
    // read loop has actually produced its events — clearing unread at
    // request *start* races every assistant `message` event this same turn
    // emits afterward and leaves the count non-zero (spec §4.9 steps 4/6,
    // §8 invariant 8). Tying the reset to `ChatStreamState`'s `Drop`
    // schedules it exactly when the read loop ends, whether that is a
    // terminal event or the client disconnecting mid-stream.
    let reset_guard = UnreadResetGuard { sessions: Arc::clone(&state.sessions), session_id: id.clone() };

    // Step 4: tail-follow the task's output stream from the resume cursor,
    // yielding one SSE event per entry, until `done`/`error`/`wait` or the
    // task disappears entirely (spec §4.9 step 4, §6).
    let stream = stream::unfold(
        ChatStreamState { task, cursor: resume_after, finished: false, _reset_guard: reset_guard },
        |mut st| async move {
            if st.finished {
                return None;
            }
            let Some(task) = st.task.clone() else {
                st.finished = true;
                return Some((Ok(Event::default().event("done").data("{}")), st));
            };
            loop {
                match task.output.tail(&st.cursor, Duration::from_secs(25)).await {
                    Ok(Some(entry)) => {
                        st.cursor = entry.id.clone();
                        let payload: EventPayload = match serde_json::from_value(entry.data) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "dropping malformed event");
                                continue;
                            }
                        };
                        let terminal = payload.is_terminal();
                        let kind = event_kind(&payload);
                        let body = serde_json::json!({
                            "event_id": entry.id,
                            "created_at": entry.created_at.timestamp(),
                            "payload": payload,
                        });
                        st.finished = terminal;
                        return Some((Ok(Event::default().event(kind).data(body.to_string())), st));
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        st.finished = true;
                        return Some((Ok(Event::default().event("error").data(serde_json::json!({"error": e.to_string()}).to_string())), st));
                    }
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct ChatStreamState {
    task: Option<Arc<stupid_agent::Task>>,
    cursor: String,
    finished: bool,
    _reset_guard: UnreadResetGuard,
}

/// Spawns the actual `clear_unread` write on drop, detached from whatever
/// future owned this guard (spec §4.9 step 6, §7: client disconnect must
/// not be able to cancel the reset).
struct UnreadResetGuard {
    sessions: Arc<stupid_agent::SessionStore>,
    session_id: String,
}

impl Drop for UnreadResetGuard {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sessions.clear_unread(&session_id) {
                warn!(session_id = %session_id, error = %e, "detached unread-count reset failed");
            }
        });
    }
}

fn event_kind(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::Plan { .. } => "plan",
        EventPayload::Title { .. } => "title",
        EventPayload::Step { .. } => "step",
        EventPayload::Message { .. } => "message",
        EventPayload::Tool { .. } => "tool",
        EventPayload::Wait => "wait",
        EventPayload::Done => "done",
        EventPayload::Error { .. } => "error",
    }
}
