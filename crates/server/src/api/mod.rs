pub mod files;
pub mod sessions;
pub mod shell;
pub mod vnc;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "agent runtime API",
        version = "0.1.0",
        description = "Session-scoped autonomous agent runtime: chat-driven planning and tool execution over an isolated sandbox.",
    ),
    tags(
        (name = "Health", description = "Liveness/readiness"),
        (name = "Sessions", description = "Session CRUD, chat SSE, stop, unread reset"),
        (name = "Files", description = "Sandbox file listing and read-through"),
        (name = "Shell", description = "Sandbox shell session output"),
    ),
    paths(
        crate::health::healthz,
        crate::api::sessions::create_session,
        crate::api::sessions::list_sessions,
        crate::api::sessions::get_session,
        crate::api::sessions::chat,
        crate::api::sessions::stop_session,
        crate::api::sessions::clear_unread,
        crate::api::sessions::delete_session,
        crate::api::files::list_files,
        crate::api::files::read_file,
        crate::api::shell::shell_output,
    ),
    components(schemas(
        crate::error::ApiErrorBody,
        crate::health::HealthResponse,
        crate::api::sessions::CreateSessionRequest,
        crate::api::files::FileReadRequest,
    ))
)]
pub struct ApiDoc;
