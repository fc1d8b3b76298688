//! `File` — the attachment entity referenced by messages, steps, and the
//! session's `files[]` (spec §3).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct File {
    pub id: String,
    pub name: String,
    /// Opaque key into whatever blob store holds the bytes. Out of scope
    /// here (spec §1): the core only threads it through.
    pub external_key: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub size: u64,
    /// Absolute path inside the sandbox, once synced there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
}

/// External object-store capability (spec §1/§9: "File upload/download
/// storage adapter" is out of scope, specified only at its interface). The
/// `Runner` calls through this to fetch an attachment's bytes before
/// syncing it into the sandbox (SPEC_FULL §11, grounded in
/// `agent_task_runner.py::_sync_file_to_sandbox`). The only implementation
/// shipped in this workspace is a no-op stand-in for "no object store
/// configured"; a real adapter plugs in behind the same trait without
/// changing `Runner`.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn download(&self, file: &File) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Default `FileStorage`: always reports the bytes as unavailable. Callers
/// still get the attachment's sandbox `filepath` assigned (spec §4.8's sync
/// step sets the path regardless of whether the bytes could be fetched).
pub struct NullFileStorage;

#[async_trait]
impl FileStorage for NullFileStorage {
    async fn download(&self, _file: &File) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
