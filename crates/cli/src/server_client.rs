//! HTTP client for connecting to a running `stupid-server` in remote mode.
//!
//! When `--server` is set, the CLI becomes a thin client that delegates to
//! the server's session and chat endpoints. Sessions and events then live
//! server-side, visible to anything else pointed at the same server.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stupid_agent::{EventPayload, SessionSummary};

pub struct ServerClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<&'a str>,
}

/// One parsed SSE frame from `/sessions/{id}/chat` (spec §4.9, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatEvent {
    pub event_id: String,
    pub payload: EventPayload,
}

impl ServerClient {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, http: reqwest::Client::new() }
    }

    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/healthz", self.base_url);
        self.http
            .get(&url)
            .timeout(std::time::Duration::from_secs(3))
            .send()
            .await
            .context("server not reachable")?;
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self.http.get(&url).send().await.context("failed to list sessions")?;
        Self::ensure_success(&resp)?;
        resp.json().await.context("failed to parse sessions list")
    }

    pub async fn create_session(&self) -> Result<SessionSummary> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self.http.post(&url).send().await.context("failed to create session")?;
        Self::ensure_success(&resp)?;
        resp.json().await.context("failed to parse created session")
    }

    /// `POST /sessions/{id}/chat`: send one turn (or resume a running one),
    /// yielding parsed events as they arrive over SSE.
    pub async fn chat(
        &self,
        session_id: &str,
        message: Option<&str>,
        resume_after: Option<&str>,
    ) -> Result<impl futures::Stream<Item = Result<ChatEvent>>> {
        let url = format!("{}/sessions/{}/chat", self.base_url, session_id);
        let resp = self
            .http
            .post(&url)
            .json(&ChatRequestBody { message, event_id: resume_after })
            .send()
            .await
            .context("failed to start chat stream")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("server returned {}: {}", status, body);
        }

        Ok(SseParser::new(resp.bytes_stream()))
    }

    fn ensure_success(resp: &reqwest::Response) -> Result<()> {
        if !resp.status().is_success() {
            bail!("server returned {}", resp.status());
        }
        Ok(())
    }
}

/// Parses an SSE byte stream of `data: {"event_id":...,"created_at":...,
/// "payload":{"type":...}}` frames into `ChatEvent`s.
struct SseParser<S> {
    inner: S,
    buffer: String,
}

impl<S> SseParser<S> {
    fn new(inner: S) -> Self {
        Self { inner, buffer: String::new() }
    }

    fn project_inner(self: std::pin::Pin<&mut Self>) -> std::pin::Pin<&mut S> {
        unsafe { self.map_unchecked_mut(|s| &mut s.inner) }
    }
}

impl<S> futures::Stream for SseParser<S>
where
    S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<ChatEvent>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.try_parse_event() {
                return std::task::Poll::Ready(Some(event));
            }

            match self.as_mut().project_inner().poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    self.buffer.push_str(&text);
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Some(Err(e.into())));
                }
                std::task::Poll::Ready(None) => {
                    if self.buffer.trim().is_empty() {
                        return std::task::Poll::Ready(None);
                    }
                    if let Some(event) = self.try_parse_event() {
                        return std::task::Poll::Ready(Some(event));
                    }
                    return std::task::Poll::Ready(None);
                }
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

impl<S> SseParser<S> {
    fn try_parse_event(&mut self) -> Option<Result<ChatEvent>> {
        loop {
            let line_end = self.buffer.find('\n')?;
            let line = self.buffer[..line_end].trim_end_matches('\r').to_string();
            self.buffer = self.buffer[line_end + 1..].to_string();

            if line.is_empty() {
                continue;
            }
            let Some(data) = line.strip_prefix("data:") else { continue };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(data) {
                Ok(value) => match serde_json::from_value::<ChatEvent>(value) {
                    Ok(event) => return Some(Ok(event)),
                    Err(_) => continue, // "done"/"error" frames without an event_id
                },
                Err(e) => {
                    tracing::debug!(data = %data, error = %e, "failed to parse SSE frame");
                    continue;
                }
            }
        }
    }
}
