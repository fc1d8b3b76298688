//! Session entity and store (spec §3, C11): the conversation thread a Task
//! runs against. One JSON file per session, grounded in the teacher's
//! one-file-per-session `SessionStore` persistence model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::attachment::File;
use crate::event::{EventPayload, MessageRole, StoredEvent};
use crate::memory::Memory;
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Running,
    Waiting,
    Completed,
}

/// The conversation thread (spec §3). `events` is the full persisted output
/// history; `memories` is keyed by agent name (`"planner"`, `"react"`) so
/// each agent's `Memory` survives across turns and task re-creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub latest_message: String,
    #[serde(default)]
    pub latest_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub sandbox_id: Option<String>,
    #[serde(default)]
    pub events: Vec<StoredEvent>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub memories: HashMap<String, Memory>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// The in-progress `Plan` a freshly (re)built `Flow` restores on the next
    /// Task invocation, distinct from `plans` (the append-only history of
    /// every CREATED/UPDATED/COMPLETED snapshot). `None` once the flow has
    /// gone through SUMMARIZING and the plan is COMPLETED.
    #[serde(default)]
    pub current_plan: Option<Plan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub status: SessionStatus,
    pub latest_message: String,
    pub latest_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            status: s.status,
            latest_message: s.latest_message.clone(),
            latest_message_at: s.latest_message_at,
            unread_count: s.unread_count,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: "New session".to_string(),
            status: SessionStatus::Pending,
            latest_message: String::new(),
            latest_message_at: None,
            unread_count: 0,
            task_id: None,
            sandbox_id: None,
            events: Vec::new(),
            files: Vec::new(),
            memories: HashMap::new(),
            plans: Vec::new(),
            current_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply one produced event: assign it an id/timestamp matching the
    /// output stream entry the caller already wrote, fold any side effects
    /// (title, latest message, unread count, plan history) and append it to
    /// history (spec §4.8, §4.9, invariant 8 in §8).
    fn record_event(&mut self, id: String, created_at: DateTime<Utc>, payload: EventPayload) {
        match &payload {
            EventPayload::Title { title } => self.title = title.clone(),
            EventPayload::Message { role: MessageRole::Assistant, message, .. } => {
                self.latest_message = message.clone();
                self.latest_message_at = Some(created_at);
                self.unread_count += 1;
            }
            EventPayload::Plan { plan } => self.plans.push(plan.clone()),
            _ => {}
        }
        self.events.push(StoredEvent { id, created_at, payload });
        self.updated_at = Utc::now();
    }
}

/// File-based session store — one JSON file per session (spec §6 names a
/// relational store with JSON columns; this workspace's persisted-state
/// section settles for the simpler per-file form the teacher already uses
/// for conversational state, see `DESIGN.md`).
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("sessions");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create session dir: {}", dir.display()))?;
        info!(path = %dir.display(), "session store initialized");
        Ok(Self { dir })
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn create(&self) -> Result<Session> {
        let session = Session::new(Uuid::new_v4().to_string());
        self.save(&session)?;
        info!(id = %session.id, "session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read session {id}"))?;
        let session = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse session {id}"))?;
        Ok(Some(session))
    }

    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match std::fs::read_to_string(&path).ok().and_then(|d| serde_json::from_str::<Session>(&d).ok()) {
                    Some(session) => out.push(SessionSummary::from(&session)),
                    None => tracing::warn!(path = %path.display(), "skipping corrupt session"),
                }
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).with_context(|| format!("failed to delete session {id}"))?;
        Ok(true)
    }

    pub fn set_status(&self, id: &str, status: SessionStatus) -> Result<Option<Session>> {
        self.update(id, |s| s.status = status)
    }

    pub fn set_task(&self, id: &str, task_id: Option<String>) -> Result<Option<Session>> {
        self.update(id, |s| s.task_id = task_id)
    }

    pub fn set_sandbox(&self, id: &str, sandbox_id: String) -> Result<Option<Session>> {
        self.update(id, |s| s.sandbox_id = Some(sandbox_id))
    }

    pub fn clear_unread(&self, id: &str) -> Result<Option<Session>> {
        self.update(id, |s| s.unread_count = 0)
    }

    pub fn set_latest_message(&self, id: &str, message: &str) -> Result<Option<Session>> {
        let now = Utc::now();
        let message = message.to_string();
        self.update(id, move |s| {
            s.latest_message = message.clone();
            s.latest_message_at = Some(now);
        })
    }

    pub fn add_file(&self, id: &str, file: File) -> Result<Option<Session>> {
        self.update(id, move |s| s.files.push(file.clone()))
    }

    /// Persist one produced event, folding its side effects (title,
    /// unread-count, plan history) into the session.
    pub fn append_event(&self, id: &str, event_id: String, created_at: DateTime<Utc>, payload: EventPayload) -> Result<Option<Session>> {
        self.update(id, move |s| s.record_event(event_id.clone(), created_at, payload.clone()))
    }

    /// Replace a session's memory slice for one agent ("planner"/"react").
    pub fn set_memory(&self, id: &str, agent: &str, memory: Memory) -> Result<Option<Session>> {
        let agent = agent.to_string();
        self.update(id, move |s| {
            s.memories.insert(agent.clone(), memory.clone());
        })
    }

    /// Persist (or clear, on completion) the Flow's in-progress plan so the
    /// next Task invocation for this session can resume EXECUTING/WAITING
    /// with the same plan instead of starting a fresh one.
    pub fn set_current_plan(&self, id: &str, plan: Option<Plan>) -> Result<Option<Session>> {
        self.update(id, move |s| s.current_plan = plan.clone())
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<Option<Session>> {
        let Some(mut session) = self.get(id)? else {
            return Ok(None);
        };
        f(&mut session);
        session.updated_at = Utc::now();
        self.save(&session)?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<()> {
        let path = self.path(&session.id);
        let data = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, data).with_context(|| format!("failed to write session {}", session.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let created = store.create().unwrap();
        assert_eq!(created.status, SessionStatus::Pending);
        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[test]
    fn append_assistant_message_increments_unread_and_sets_latest() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let s = store.create().unwrap();
        store
            .append_event(
                &s.id,
                "1".to_string(),
                Utc::now(),
                EventPayload::Message { role: MessageRole::Assistant, message: "hi there".to_string(), attachments: vec![] },
            )
            .unwrap();
        let after = store.get(&s.id).unwrap().unwrap();
        assert_eq!(after.unread_count, 1);
        assert_eq!(after.latest_message, "hi there");
        assert_eq!(after.events.len(), 1);
    }

    #[test]
    fn clear_unread_resets_to_zero() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let s = store.create().unwrap();
        store
            .append_event(&s.id, "1".to_string(), Utc::now(), EventPayload::Message { role: MessageRole::Assistant, message: "hi".to_string(), attachments: vec![] })
            .unwrap();
        store.clear_unread(&s.id).unwrap();
        assert_eq!(store.get(&s.id).unwrap().unwrap().unread_count, 0);
    }

    #[test]
    fn status_transitions_persist() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let s = store.create().unwrap();
        store.set_status(&s.id, SessionStatus::Running).unwrap();
        assert_eq!(store.get(&s.id).unwrap().unwrap().status, SessionStatus::Running);
    }

    #[test]
    fn delete_removes_session() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let s = store.create().unwrap();
        assert!(store.delete(&s.id).unwrap());
        assert!(store.get(&s.id).unwrap().is_none());
    }
}
