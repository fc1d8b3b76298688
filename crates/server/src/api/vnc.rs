//! `WS /sessions/{id}/vnc` (spec §6): a transparent bidirectional proxy to
//! the sandbox's VNC WebSocket, negotiating the `binary` or `base64`
//! subprotocol if the client offers one.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message as UpstreamMessage;
use tracing::{info, warn};

use crate::state::AppState;

const SUPPORTED_SUBPROTOCOLS: [&str; 2] = ["binary", "base64"];

pub async fn vnc_proxy(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let subprotocol = ws
        .selected_protocol()
        .map(|s| s.to_str().unwrap_or_default().to_string());
    let mut upgrade = ws;
    if let Some(proto) = subprotocol.as_deref().filter(|p| SUPPORTED_SUBPROTOCOLS.contains(p)) {
        upgrade = upgrade.protocols([proto.to_string()]);
    }

    upgrade.on_upgrade(move |socket| async move {
        if let Err(e) = proxy(socket, state, &id).await {
            warn!(session_id = %id, error = %e, "vnc proxy ended with error");
        }
    })
}

async fn proxy(client: WebSocket, state: Arc<AppState>, session_id: &str) -> anyhow::Result<()> {
    let session = state
        .sessions
        .get(session_id)?
        .ok_or_else(|| anyhow::anyhow!("session {session_id} not found"))?;
    let sandbox_id = session.sandbox_id.ok_or_else(|| anyhow::anyhow!("session has no sandbox yet"))?;
    let sandbox = stupid_sandbox::SandboxSession::get(&sandbox_id, &state.config.sandbox).await?;

    info!(session_id, vnc_url = %sandbox.vnc_url(), "opening vnc proxy");
    let (upstream, _response) = tokio_tungstenite::connect_async(sandbox.vnc_url()).await?;
    let (mut up_tx, mut up_rx) = upstream.split();
    let (mut down_tx, mut down_rx) = client.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = down_rx.next().await {
            let forwarded = match msg {
                Message::Binary(b) => UpstreamMessage::Binary(b),
                Message::Text(t) => UpstreamMessage::Text(t.to_string().into()),
                Message::Close(_) => break,
                Message::Ping(p) => UpstreamMessage::Ping(p),
                Message::Pong(p) => UpstreamMessage::Pong(p),
            };
            if up_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = up_rx.next().await {
            let forwarded = match msg {
                UpstreamMessage::Binary(b) => Message::Binary(b),
                UpstreamMessage::Text(t) => Message::Text(t.as_str().to_string().into()),
                UpstreamMessage::Close(_) => break,
                UpstreamMessage::Ping(p) => Message::Ping(p),
                UpstreamMessage::Pong(p) => Message::Pong(p),
                UpstreamMessage::Frame(_) => continue,
            };
            if down_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
    Ok(())
}
