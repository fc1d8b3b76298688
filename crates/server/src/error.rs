//! API error envelope: maps internal errors to the error kinds surfaced to
//! clients and stored in the event log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stupid_core::error::ErrorKind;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
    pub kind: String,
}

pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::BadRequest, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::NotFound, message: message.into() }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Server, message: message.into() }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::server(format!("{e:#}"))
    }
}

impl From<stupid_agent::RunnerError> for ApiError {
    fn from(e: stupid_agent::RunnerError) -> Self {
        match &e {
            stupid_agent::RunnerError::SessionNotFound(id) => Self::not_found(format!("session {id} not found")),
            other => Self::server(other.to_string()),
        }
    }
}

impl From<stupid_queue::StreamError> for ApiError {
    fn from(e: stupid_queue::StreamError) -> Self {
        Self::server(e.to_string())
    }
}

impl From<stupid_sandbox::SandboxError> for ApiError {
    fn from(e: stupid_sandbox::SandboxError) -> Self {
        Self::server(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Server => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiErrorBody { error: self.message, kind: self.kind.to_string() })).into_response()
    }
}
