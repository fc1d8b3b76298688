//! HTTP/WebSocket surface for the agent runtime (spec §6, C12).
//!
//! Thin by design: every handler in `api` adapts `stupid-agent`'s
//! `Runner`/`SessionStore`/`Task` to request/response and SSE/WS framing.
//! The state machines, event production, and persistence all live upstream
//! in `stupid-agent`.

pub mod api;
pub mod error;
pub mod health;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::state::AppState;

/// Build the complete application router (spec §6: all HTTP/WS routes,
/// OpenAPI docs at `/docs`, permissive CORS for local tooling).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/sessions", get(api::sessions::list_sessions).post(api::sessions::create_session))
        .route("/sessions/stream", post(api::sessions::list_sessions_stream))
        .route("/sessions/{id}", get(api::sessions::get_session))
        .route("/sessions/{id}/chat", post(api::sessions::chat))
        .route("/sessions/{id}/stop", post(api::sessions::stop_session))
        .route("/sessions/{id}/delete", post(api::sessions::delete_session))
        .route(
            "/sessions/{id}/clear-unread-message-count",
            post(api::sessions::clear_unread),
        )
        .route("/sessions/{id}/files", get(api::files::list_files))
        .route("/sessions/{id}/file", post(api::files::read_file))
        .route("/sessions/{id}/shell", post(api::shell::shell_output))
        .route("/sessions/{id}/vnc", get(api::vnc::vnc_proxy))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::ApiDoc::openapi()))
}
