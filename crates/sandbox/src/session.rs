//! HTTP client for a remote sandbox: an isolated shell + filesystem + browser
//! environment the agent loop drives tools against.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use stupid_core::config::SandboxConfig;

use crate::browser::Browser;
use crate::error::SandboxError;
use crate::result::SandboxResult;

/// A live sandbox: either a pre-provisioned shared endpoint, or one freshly
/// created from a container image.
pub struct SandboxSession {
    client: reqwest::Client,
    base_url: String,
    id: String,
    cdp_url: String,
    vnc_url: String,
    ready_poll_attempts: u32,
    ready_poll_interval: Duration,
}

impl SandboxSession {
    /// Create a fresh sandbox from the configured image (or attach to the
    /// shared endpoint, if one is configured).
    pub async fn create(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let client = reqwest::Client::new();

        if let Some(endpoint) = &config.shared_endpoint {
            return Self::get_at(client, endpoint, None, config).await;
        }

        let url = format!("{}/sandboxes", default_provisioner_url());
        debug!(image = %config.image, "provisioning sandbox");
        let resp = client
            .post(&url)
            .json(&json!({ "image": config.image }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status >= 300 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Provision(format!(
                "provisioner returned {status}: {body}"
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| SandboxError::InvalidResponse("missing 'id'".into()))?
            .to_string();
        let base_url = body["base_url"]
            .as_str()
            .ok_or_else(|| SandboxError::InvalidResponse("missing 'base_url'".into()))?
            .to_string();
        let cdp_url = body["cdp_url"].as_str().unwrap_or_default().to_string();
        let vnc_url = body["vnc_url"].as_str().unwrap_or_default().to_string();

        let session = Self {
            client,
            base_url,
            id,
            cdp_url,
            vnc_url,
            ready_poll_attempts: config.ready_poll_attempts,
            ready_poll_interval: Duration::from_secs(config.ready_poll_interval_secs),
        };
        session.ensure_ready().await?;
        Ok(session)
    }

    /// Attach to an already-provisioned sandbox by id.
    pub async fn get(id: &str, config: &SandboxConfig) -> Result<Self, SandboxError> {
        let client = reqwest::Client::new();
        let base_url = config
            .shared_endpoint
            .clone()
            .unwrap_or_else(default_provisioner_url);
        Self::get_at(client, &base_url, Some(id.to_string()), config).await
    }

    async fn get_at(
        client: reqwest::Client,
        base_url: &str,
        id: Option<String>,
        config: &SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            id,
            cdp_url: String::new(),
            vnc_url: String::new(),
            ready_poll_attempts: config.ready_poll_attempts,
            ready_poll_interval: Duration::from_secs(config.ready_poll_interval_secs),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cdp_url(&self) -> &str {
        &self.cdp_url
    }

    pub fn vnc_url(&self) -> &str {
        &self.vnc_url
    }

    /// Poll `supervisor/status` until every named service reports `RUNNING`,
    /// or give up after `ready_poll_attempts` (spec §4.2: "up to 30 attempts
    /// x 2s").
    pub async fn ensure_ready(&self) -> Result<(), SandboxError> {
        let url = format!("{}/sandbox/{}/supervisor/status", self.base_url, self.id);
        for attempt in 0..self.ready_poll_attempts {
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.json::<Value>().await {
                        if all_services_running(&body) {
                            info!(sandbox_id = %self.id, attempt, "sandbox ready");
                            return Ok(());
                        }
                    }
                }
                Ok(resp) => debug!(sandbox_id = %self.id, status = resp.status().as_u16(), "supervisor/status not ok yet"),
                Err(e) => debug!(sandbox_id = %self.id, error = %e, "supervisor/status unreachable"),
            }
            tokio::time::sleep(self.ready_poll_interval).await;
        }
        warn!(sandbox_id = %self.id, attempts = self.ready_poll_attempts, "sandbox never became ready");
        Err(SandboxError::NotReady {
            attempts: self.ready_poll_attempts,
        })
    }

    pub async fn destroy(&self) -> Result<bool, SandboxError> {
        let url = format!("{}/sandboxes/{}", self.base_url, self.id);
        let resp = self.client.delete(&url).send().await?;
        Ok(resp.status().is_success())
    }

    pub fn browser(&self) -> Browser {
        Browser::new(self.client.clone(), self.base_url.clone(), self.id.clone())
    }

    async fn post(&self, path: &str, body: Value) -> Result<SandboxResult, SandboxError> {
        let url = format!("{}/sandbox/{}/{}", self.base_url, self.id, path);
        let resp = self.client.post(&url).json(&body).send().await?;
        self.into_result(resp).await
    }

    async fn get_(&self, path: &str, query: &[(&str, String)]) -> Result<SandboxResult, SandboxError> {
        let url = format!("{}/sandbox/{}/{}", self.base_url, self.id, path);
        let resp = self.client.get(&url).query(query).send().await?;
        self.into_result(resp).await
    }

    async fn into_result(&self, resp: reqwest::Response) -> Result<SandboxResult, SandboxError> {
        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        let message = body["message"].as_str().unwrap_or_default().to_string();
        let data = body.get("data").cloned();
        Ok(SandboxResult::from_sandbox(status, message, data))
    }

    // ── Shell ──────────────────────────────────────────────────

    pub async fn exec_command(
        &self,
        session_id: &str,
        exec_dir: &str,
        command: &str,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "shell/exec",
            json!({ "session_id": session_id, "exec_dir": exec_dir, "command": command }),
        )
        .await
    }

    pub async fn view_shell(&self, session_id: &str, console: bool) -> Result<SandboxResult, SandboxError> {
        self.post("shell/view", json!({ "session_id": session_id, "console": console }))
            .await
    }

    pub async fn wait_for_process(
        &self,
        session_id: &str,
        seconds: Option<u32>,
    ) -> Result<SandboxResult, SandboxError> {
        self.post("shell/wait", json!({ "session_id": session_id, "seconds": seconds }))
            .await
    }

    pub async fn write_to_process(
        &self,
        session_id: &str,
        input_text: &str,
        press_enter: bool,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "shell/write",
            json!({ "session_id": session_id, "input_text": input_text, "press_enter": press_enter }),
        )
        .await
    }

    pub async fn kill_process(&self, session_id: &str) -> Result<SandboxResult, SandboxError> {
        self.post("shell/kill", json!({ "session_id": session_id })).await
    }

    // ── Files ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn file_write(
        &self,
        file_path: &str,
        content: &str,
        append: bool,
        leading_newline: bool,
        trailing_newline: bool,
        sudo: bool,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "file/write",
            json!({
                "file_path": file_path,
                "content": content,
                "append": append,
                "leading_newline": leading_newline,
                "trailing_newline": trailing_newline,
                "sudo": sudo,
            }),
        )
        .await
    }

    pub async fn file_read(
        &self,
        file_path: &str,
        start_line: Option<u32>,
        end_line: Option<u32>,
        sudo: bool,
        max_length: u32,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "file/read",
            json!({
                "file_path": file_path,
                "start_line": start_line,
                "end_line": end_line,
                "sudo": sudo,
                "max_length": max_length,
            }),
        )
        .await
    }

    pub async fn file_exists(&self, file_path: &str) -> Result<SandboxResult, SandboxError> {
        self.get_("file/exists", &[("file_path", file_path.to_string())])
            .await
    }

    pub async fn file_delete(&self, file_path: &str) -> Result<SandboxResult, SandboxError> {
        self.post("file/delete", json!({ "file_path": file_path })).await
    }

    pub async fn file_list(&self, dir_path: &str) -> Result<SandboxResult, SandboxError> {
        self.get_("file/list", &[("dir_path", dir_path.to_string())]).await
    }

    pub async fn file_replace(
        &self,
        file_path: &str,
        old_text: &str,
        new_text: &str,
        sudo: bool,
    ) -> Result<SandboxResult, SandboxError> {
        self.post(
            "file/replace",
            json!({ "file_path": file_path, "old_text": old_text, "new_text": new_text, "sudo": sudo }),
        )
        .await
    }

    pub async fn file_search(
        &self,
        file_path: &str,
        regex: &str,
        sudo: bool,
    ) -> Result<SandboxResult, SandboxError> {
        self.post("file/search", json!({ "file_path": file_path, "regex": regex, "sudo": sudo }))
            .await
    }

    pub async fn file_find(&self, dir_path: &str, glob_pattern: &str) -> Result<SandboxResult, SandboxError> {
        self.post("file/find", json!({ "dir_path": dir_path, "glob_pattern": glob_pattern }))
            .await
    }

    pub async fn file_upload(
        &self,
        file_data: &[u8],
        file_path: &str,
        filename: Option<&str>,
    ) -> Result<SandboxResult, SandboxError> {
        let url = format!("{}/sandbox/{}/file/upload", self.base_url, self.id);
        let part = reqwest::multipart::Part::bytes(file_data.to_vec())
            .file_name(filename.unwrap_or("upload.bin").to_string());
        let form = reqwest::multipart::Form::new()
            .text("file_path", file_path.to_string())
            .part("file", part);
        let resp = self.client.post(&url).multipart(form).send().await?;
        self.into_result(resp).await
    }

    pub async fn file_download(&self, file_path: &str) -> Result<Vec<u8>, SandboxError> {
        let url = format!("{}/sandbox/{}/file/download", self.base_url, self.id);
        let resp = self
            .client
            .get(&url)
            .query(&[("file_path", file_path)])
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status >= 300 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Http { status, body });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

fn default_provisioner_url() -> String {
    "http://localhost:8900".to_string()
}

/// `supervisor/status` reports each service's state either as an object
/// keyed by service name or as an array of `{name, state}` entries; ready
/// means every one of them is `"RUNNING"` (spec §4.2).
fn all_services_running(body: &Value) -> bool {
    let services = body.get("services").unwrap_or(body);
    let states: Vec<&Value> = match services {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => return false,
    };
    if states.is_empty() {
        return false;
    }
    states.iter().all(|entry| {
        let state = entry.get("state").and_then(Value::as_str).or_else(|| entry.as_str());
        state == Some("RUNNING")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_result_from_success_status() {
        let r = SandboxResult::from_sandbox(200, "ok", None);
        assert!(r.success);
    }

    #[test]
    fn sandbox_result_from_error_status() {
        let r = SandboxResult::from_sandbox(500, "boom", None);
        assert!(!r.success);
    }

    #[test]
    fn all_services_running_accepts_object_form() {
        let body = json!({"services": {"shell": {"state": "RUNNING"}, "browser": {"state": "RUNNING"}}});
        assert!(all_services_running(&body));
    }

    #[test]
    fn all_services_running_accepts_array_form() {
        let body = json!({"services": [{"name": "shell", "state": "RUNNING"}, {"name": "browser", "state": "STARTING"}]});
        assert!(!all_services_running(&body));
    }

    #[test]
    fn all_services_running_false_when_empty() {
        let body = json!({"services": {}});
        assert!(!all_services_running(&body));
    }
}
