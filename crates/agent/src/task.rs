//! Task (spec §4.8, C10): a cancellable background worker bound to a
//! Session's input/output streams. At most one live Task may exist per
//! session at a time; the registry enforces that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use stupid_queue::Stream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Cooperative cancellation: a flag plus a `Notify` so a task blocked on
/// `tail()` wakes up promptly instead of waiting for the next poll interval.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, else waits for `cancel()`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A running (or finished) background worker for one session (spec §4.8).
/// `input`/`output` are the session's paired streams (spec §4.2); the
/// worker itself is whatever future the caller spawned with `invoke`.
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub input: Arc<dyn Stream>,
    pub output: Arc<dyn Stream>,
    cancel: CancelToken,
    done: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    fn new(id: String, session_id: String, input: Arc<dyn Stream>, output: Arc<dyn Stream>) -> Self {
        Self { id, session_id, input, output, cancel: CancelToken::new(), done: Arc::new(AtomicBool::new(false)), handle: Mutex::new(None) }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Spawn `worker` unless this task already has a running or completed
    /// handle (spec §4.8: "invoke is a no-op if the task is already running
    /// or done"). `worker` is expected to mark the task done itself via the
    /// returned done-flag setter before it exits.
    pub fn invoke<F>(self: &Arc<Self>, worker: F)
    where
        F: FnOnce(Arc<Task>) -> JoinHandle<()>,
    {
        let mut guard = self.handle.lock().unwrap();
        if guard.is_some() || self.done.load(Ordering::SeqCst) {
            return;
        }
        *guard = Some(worker(Arc::clone(self)));
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Process-local registry enforcing "at most one live Task per session"
/// (spec §4.8, invariant 7 in §8).
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, Arc<Task>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { tasks: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Create a new task for `session_id`, bound to its input/output
    /// streams. Returns the existing live task instead if one is already
    /// registered and not yet done.
    pub fn create_or_get(&self, session_id: &str, input: Arc<dyn Stream>, output: Arc<dyn Stream>) -> Arc<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(existing) = tasks.get(session_id) {
            if !existing.done() {
                return Arc::clone(existing);
            }
        }
        let task = Arc::new(Task::new(uuid::Uuid::new_v4().to_string(), session_id.to_string(), input, output));
        tasks.insert(session_id.to_string(), Arc::clone(&task));
        task
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Task>> {
        self.tasks.lock().unwrap().get(session_id).cloned()
    }

    /// Cancel and drop the task registered for `session_id`, if any.
    pub fn destroy(&self, session_id: &str) -> bool {
        let removed = self.tasks.lock().unwrap().remove(session_id);
        if let Some(task) = removed {
            task.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel and drop every registered task (server shutdown).
    pub fn destroy_all(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (_, task) in tasks.drain() {
            task.cancel();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stupid_queue::InMemoryStream;

    fn streams() -> (Arc<dyn Stream>, Arc<dyn Stream>) {
        (Arc::new(InMemoryStream::new()), Arc::new(InMemoryStream::new()))
    }

    #[test]
    fn create_or_get_returns_same_task_while_not_done() {
        let reg = TaskRegistry::new();
        let (i1, o1) = streams();
        let t1 = reg.create_or_get("s1", i1, o1);
        let (i2, o2) = streams();
        let t2 = reg.create_or_get("s1", i2, o2);
        assert_eq!(t1.id, t2.id);
    }

    #[test]
    fn create_or_get_replaces_a_done_task() {
        let reg = TaskRegistry::new();
        let (i1, o1) = streams();
        let t1 = reg.create_or_get("s1", i1, o1);
        t1.mark_done();
        let (i2, o2) = streams();
        let t2 = reg.create_or_get("s1", i2, o2);
        assert_ne!(t1.id, t2.id);
    }

    #[test]
    fn destroy_cancels_and_removes() {
        let reg = TaskRegistry::new();
        let (i, o) = streams();
        let t = reg.create_or_get("s1", i, o);
        assert!(reg.destroy("s1"));
        assert!(t.is_cancelled());
        assert!(reg.get("s1").is_none());
    }

    #[tokio::test]
    async fn cancel_token_wakes_pending_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn invoke_is_noop_once_a_handle_is_set() {
        let reg = TaskRegistry::new();
        let (i, o) = streams();
        let task = reg.create_or_get("s1", i, o);
        let calls = Arc::new(AtomicBool::new(false));
        let calls2 = Arc::clone(&calls);
        task.invoke(move |_t| {
            calls2.store(true, Ordering::SeqCst);
            tokio::spawn(async {})
        });
        assert!(calls.load(Ordering::SeqCst));
        let calls3 = Arc::clone(&calls);
        calls3.store(false, Ordering::SeqCst);
        task.invoke(move |_t| {
            calls3.store(true, Ordering::SeqCst);
            tokio::spawn(async {})
        });
        assert!(!calls.load(Ordering::SeqCst));
    }
}
