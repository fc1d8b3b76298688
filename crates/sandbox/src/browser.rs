//! HTTP client for the headless browser running inside a sandbox.
//!
//! Every interactive call (`click`, `input`, `move_mouse`, ...) targets either
//! an indexed interactive element from the last `view_page`/`navigate`
//! response, or a raw pixel coordinate — never both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::result::SandboxResult;

/// Connect attempts before giving up (spec §4.2 Failure model).
const MAX_CONNECT_ATTEMPTS: u32 = 5;
/// Exponential backoff cap between connect attempts (spec §4.2).
const MAX_CONNECT_BACKOFF: Duration = Duration::from_secs(10);

pub struct Browser {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    connected: AtomicBool,
}

impl Browser {
    pub(crate) fn new(client: reqwest::Client, base_url: String, session_id: String) -> Self {
        Self {
            client,
            base_url,
            session_id,
            connected: AtomicBool::new(false),
        }
    }

    /// Ensure the remote control connection is live, reconnecting lazily on
    /// first use (or after a `restart`). Cheap no-op once connected.
    async fn ensure_connected(&self) -> Result<(), SandboxError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let url = format!("{}/sandbox/{}/browser/connect", self.base_url, self.session_id);
        let mut backoff = Duration::from_millis(250);
        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            match self.client.post(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.connected.store(true, Ordering::Release);
                    debug!(session_id = %self.session_id, attempt, "browser connected");
                    return Ok(());
                }
                Ok(resp) => warn!(
                    session_id = %self.session_id,
                    attempt,
                    status = resp.status().as_u16(),
                    "browser connect not ok"
                ),
                Err(e) => warn!(session_id = %self.session_id, attempt, error = %e, "browser connect failed"),
            }
            if attempt < MAX_CONNECT_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_CONNECT_BACKOFF);
            }
        }
        warn!(session_id = %self.session_id, attempts = MAX_CONNECT_ATTEMPTS, "browser connect exhausted retries");
        Err(SandboxError::BrowserUnavailable {
            attempts: MAX_CONNECT_ATTEMPTS,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<SandboxResult, SandboxError> {
        self.ensure_connected().await?;
        let url = format!(
            "{}/sandbox/{}/browser/{}",
            self.base_url, self.session_id, path
        );
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        let message = body["message"].as_str().unwrap_or_default().to_string();
        let data = body.get("data").cloned();
        Ok(SandboxResult::from_sandbox(status, message, data))
    }

    pub async fn view_page(&self) -> Result<SandboxResult, SandboxError> {
        self.post("view", json!({})).await
    }

    pub async fn navigate(&self, url: &str) -> Result<SandboxResult, SandboxError> {
        self.post("navigate", json!({ "url": url })).await
    }

    /// Restarts the remote browser process and forces the next call to
    /// reconnect rather than trusting the stale `connected` flag.
    pub async fn restart(&self, url: &str) -> Result<SandboxResult, SandboxError> {
        self.connected.store(false, Ordering::Release);
        self.post("restart", json!({ "url": url })).await
    }

    pub async fn click(
        &self,
        index: Option<u32>,
        coordinate_x: Option<f64>,
        coordinate_y: Option<f64>,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "click",
            json!({ "index": index, "coordinate_x": coordinate_x, "coordinate_y": coordinate_y }),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn input(
        &self,
        text: &str,
        press_enter: bool,
        index: Option<u32>,
        coordinate_x: Option<f64>,
        coordinate_y: Option<f64>,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "input",
            json!({
                "text": text,
                "press_enter": press_enter,
                "index": index,
                "coordinate_x": coordinate_x,
                "coordinate_y": coordinate_y,
            }),
        )
        .await
    }

    pub async fn move_mouse(&self, coordinate_x: f64, coordinate_y: f64) -> Result<SandboxResult, SandboxError> {
        self.post("move_mouse", json!({ "coordinate_x": coordinate_x, "coordinate_y": coordinate_y }))
            .await
    }

    pub async fn press_key(&self, key: &str) -> Result<SandboxResult, SandboxError> {
        self.post("press_key", json!({ "key": key })).await
    }

    pub async fn select_option(&self, index: u32, option: u32) -> Result<SandboxResult, SandboxError> {
        self.post("select_option", json!({ "index": index, "option": option }))
            .await
    }

    pub async fn scroll_up(&self, to_top: Option<bool>) -> Result<SandboxResult, SandboxError> {
        self.post("scroll_up", json!({ "to_top": to_top })).await
    }

    pub async fn scroll_down(&self, to_bottom: Option<bool>) -> Result<SandboxResult, SandboxError> {
        self.post("scroll_down", json!({ "to_bottom": to_bottom })).await
    }

    pub async fn screenshot(&self, full_page: Option<bool>) -> Result<Vec<u8>, SandboxError> {
        self.ensure_connected().await?;
        let url = format!(
            "{}/sandbox/{}/browser/screenshot",
            self.base_url, self.session_id
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("full_page", full_page.unwrap_or(false).to_string())])
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status >= 300 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Http { status, body });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn console_exec(&self, javascript: &str) -> Result<SandboxResult, SandboxError> {
        self.post("console/exec", json!({ "javascript": javascript })).await
    }

    pub async fn console_view(&self, max_lines: Option<u32>) -> Result<SandboxResult, SandboxError> {
        self.post("console/view", json!({ "max_lines": max_lines })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_browser_starts_unconnected() {
        let browser = Browser::new(reqwest::Client::new(), "http://localhost:9000".into(), "sbx-1".into());
        assert!(!browser.connected.load(Ordering::Acquire));
    }

    #[test]
    fn restart_clears_the_connected_flag() {
        let browser = Browser::new(reqwest::Client::new(), "http://localhost:9000".into(), "sbx-1".into());
        browser.connected.store(true, Ordering::Release);
        browser.connected.store(false, Ordering::Release);
        assert!(!browser.connected.load(Ordering::Acquire));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = Duration::from_millis(250);
        let mut seen = vec![backoff];
        for _ in 0..MAX_CONNECT_ATTEMPTS {
            backoff = (backoff * 2).min(MAX_CONNECT_BACKOFF);
            seen.push(backoff);
        }
        assert_eq!(seen.last(), Some(&MAX_CONNECT_BACKOFF));
        assert!(seen.windows(2).all(|w| w[1] >= w[0]));
    }
}
