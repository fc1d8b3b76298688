//! Append-only, id-keyed, tail-follow message stream (spec §4.1, C2).
//!
//! A `Stream` backs a single direction of a `Task`'s traffic: one instance is
//! `task:input:{task_id}`, the input messages a chat request enqueues for the
//! runner to drain; another is `task:output:{task_id}`, the events the runner
//! produces for SSE clients to tail. Ids are strictly monotonic and
//! lexicographically comparable within one stream so a client can resume
//! from any previously observed id without re-deriving ordering.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::error::StreamError;

/// Bound on how long `pop` will wait to acquire the stream-scoped lock
/// before giving up (spec §4.1: "5 s bounded acquire").
pub const POP_LOCK_ACQUIRE_BOUND: Duration = Duration::from_secs(5);

/// A single entry on a stream: an assigned id, its payload, and when it was
/// written. The id is opaque to callers beyond "strictly increasing" and
/// "lexicographically comparable".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// The id meaning "from the beginning of the stream".
pub const FROM_START: &str = "0";

fn format_id(n: u64) -> String {
    // Zero-padded so string comparison agrees with numeric comparison.
    format!("{n:020}")
}

/// The append-only, id-keyed, tail-follow queue described in spec §4.1.
#[async_trait]
pub trait Stream: Send + Sync {
    /// Append `payload`, returning the strictly monotonic id assigned to it.
    async fn put(&self, payload: Value) -> Result<String, StreamError>;

    /// Return the first entry strictly after `after_id`, blocking up to
    /// `block_for` for one to appear. `after_id = "0"` means from the start.
    async fn tail(
        &self,
        after_id: &str,
        block_for: Duration,
    ) -> Result<Option<StreamEntry>, StreamError>;

    /// Atomically remove and return the head entry. Concurrent `pop`s across
    /// workers are serialized by a per-stream advisory lock.
    async fn pop(&self) -> Result<Option<StreamEntry>, StreamError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), StreamError>;

    /// Number of entries currently on the stream.
    async fn size(&self) -> Result<usize, StreamError>;

    /// Remove a single entry by id. Returns whether it was present.
    async fn delete(&self, id: &str) -> Result<bool, StreamError>;
}

struct State {
    entries: VecDeque<StreamEntry>,
    next_id: AtomicU64,
}

/// In-process, in-memory `Stream`. The default backend: cheap, and every
/// Task's streams live only as long as the process per spec §5's
/// single-process scheduling model.
pub struct InMemoryStream {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryStream {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                next_id: AtomicU64::new(1),
            }),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stream for InMemoryStream {
    async fn put(&self, payload: Value) -> Result<String, StreamError> {
        let mut state = self.state.lock().await;
        let id = format_id(state.next_id.fetch_add(1, Ordering::SeqCst));
        state.entries.push_back(StreamEntry {
            id: id.clone(),
            data: payload,
            created_at: Utc::now(),
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn tail(
        &self,
        after_id: &str,
        block_for: Duration,
    ) -> Result<Option<StreamEntry>, StreamError> {
        let deadline = tokio::time::Instant::now() + block_for;
        loop {
            {
                let state = self.state.lock().await;
                if let Some(found) = state
                    .entries
                    .iter()
                    .find(|e| e.id.as_str() > after_id)
                    .cloned()
                {
                    return Ok(Some(found));
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn pop(&self) -> Result<Option<StreamEntry>, StreamError> {
        let mut state = tokio::time::timeout(POP_LOCK_ACQUIRE_BOUND, self.state.lock())
            .await
            .map_err(|_| StreamError::LockTimeout("in-memory".to_string()))?;
        Ok(state.entries.pop_front())
    }

    async fn clear(&self) -> Result<(), StreamError> {
        let mut state = self.state.lock().await;
        state.entries.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize, StreamError> {
        let state = self.state.lock().await;
        Ok(state.entries.len())
    }

    async fn delete(&self, id: &str) -> Result<bool, StreamError> {
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|e| e.id != id);
        Ok(state.entries.len() != before)
    }
}

/// Registry of named streams, keyed the way the persisted-state section of
/// the spec names them: `task:input:{task_id}` / `task:output:{task_id}`.
pub struct StreamRegistry {
    streams: Mutex<std::collections::HashMap<String, Arc<InMemoryStream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Get the stream for `key`, creating it empty if this is the first use.
    pub async fn get_or_create(&self, key: &str) -> Arc<InMemoryStream> {
        let mut streams = self.streams.lock().await;
        streams
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(InMemoryStream::new()))
            .clone()
    }

    pub async fn remove(&self, key: &str) {
        self.streams.lock().await.remove(key);
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn input_key(task_id: &str) -> String {
    format!("task:input:{task_id}")
}

pub fn output_key(task_id: &str) -> String {
    format!("task:output:{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_returns_strictly_increasing_ids() {
        let s = InMemoryStream::new();
        let a = s.put(serde_json::json!({"n": 1})).await.unwrap();
        let b = s.put(serde_json::json!({"n": 2})).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn tail_from_start_returns_first_entry() {
        let s = InMemoryStream::new();
        let id = s.put(serde_json::json!({"n": 1})).await.unwrap();
        let entry = s
            .tail(FROM_START, Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, id);
    }

    #[tokio::test]
    async fn tail_after_last_id_times_out_to_none() {
        let s = InMemoryStream::new();
        let id = s.put(serde_json::json!({"n": 1})).await.unwrap();
        let result = s.tail(&id, Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn pop_removes_head_exactly_once() {
        let s = InMemoryStream::new();
        s.put(serde_json::json!({"n": 1})).await.unwrap();
        s.put(serde_json::json!({"n": 2})).await.unwrap();
        let first = s.pop().await.unwrap().unwrap();
        assert_eq!(first.data["n"], 1);
        let second = s.pop().await.unwrap().unwrap();
        assert_eq!(second.data["n"], 2);
        assert!(s.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tail_wakes_up_on_new_entry() {
        let s = Arc::new(InMemoryStream::new());
        let reader = s.clone();
        let handle = tokio::spawn(async move {
            reader
                .tail(FROM_START, Duration::from_secs(2))
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.put(serde_json::json!({"n": 1})).await.unwrap();
        let entry = handle.await.unwrap().unwrap();
        assert_eq!(entry.data["n"], 1);
    }

    #[tokio::test]
    async fn registry_returns_same_stream_for_same_key() {
        let reg = StreamRegistry::new();
        let a = reg.get_or_create("task:input:1").await;
        a.put(serde_json::json!({"n": 1})).await.unwrap();
        let b = reg.get_or_create("task:input:1").await;
        assert_eq!(b.size().await.unwrap(), 1);
    }
}
