//! Runner (spec §4.8): wires a session's Task to its Sandbox, tool registry,
//! and Flow, and drains its input stream into persisted, streamed events.

use std::sync::Arc;

use stupid_core::config::Config;
use stupid_mcp::{A2aCallAgentTool, A2aListAgentsTool, A2aToolbox, McpToolbox, McpToolboxTool};
use stupid_queue::Stream;
use stupid_sandbox::SandboxSession;
use stupid_tool_runtime::provider::ToolAwareLlmProvider;
use stupid_tool_runtime::registry::ToolRegistry;
use stupid_tool_runtime::tools::{
    AskUserTool, BrowserClickTool, BrowserInputTool, BrowserNavigateTool, BrowserScreenshotTool,
    BrowserScrollTool, BrowserViewTool, FileDeleteTool, FileExistsTool, FileFindTool,
    FileReadTool, FileReplaceTool, FileSearchTool, FileWriteTool, HttpSearchEngine, SearchWebTool,
    ShellExecTool, ShellKillTool, ShellViewTool, ShellWaitTool, ShellWriteTool,
};
use tracing::{error, info, warn};

use crate::agent_loop::AgentLoopConfig;
use crate::attachment::{File, FileStorage, NullFileStorage};
use crate::event::EventPayload;
use crate::flow::{Flow, FlowError};
use crate::planner::Planner;
use crate::react::ReAct;
use crate::session::{Session, SessionStatus, SessionStore};
use crate::task::{Task, TaskRegistry};

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error(transparent)]
    Sandbox(#[from] stupid_sandbox::SandboxError),
    #[error(transparent)]
    Llm(#[from] stupid_tool_runtime::provider::LlmError),
    #[error(transparent)]
    Stream(#[from] stupid_queue::StreamError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("session store error: {0}")]
    Session(#[from] anyhow::Error),
}

/// One chat turn enqueued onto a session's input stream.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatInput {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<File>,
}

/// Shared dependencies the HTTP layer hands to every session. Cheap to
/// clone; every field is itself an `Arc`.
#[derive(Clone)]
pub struct Runner {
    config: Arc<Config>,
    sessions: Arc<SessionStore>,
    tasks: Arc<TaskRegistry>,
    file_storage: Arc<dyn FileStorage>,
}

impl Runner {
    pub fn new(config: Arc<Config>, sessions: Arc<SessionStore>, tasks: Arc<TaskRegistry>) -> Self {
        Self { config, sessions, tasks, file_storage: Arc::new(NullFileStorage) }
    }

    /// Swap in a real object-store-backed `FileStorage` (spec §1/§9: out of
    /// scope here, injected by the embedder).
    pub fn with_file_storage(mut self, file_storage: Arc<dyn FileStorage>) -> Self {
        self.file_storage = file_storage;
        self
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Enqueue one chat turn for `session_id`, creating (or reusing) its
    /// Task and spawning the worker if it is not already running (spec
    /// §4.8: "invoke is a no-op if the task is already live").
    pub async fn enqueue_chat(&self, session_id: &str, input: ChatInput) -> Result<Arc<Task>, RunnerError> {
        if self.sessions.get(session_id)?.is_none() {
            return Err(RunnerError::SessionNotFound(session_id.to_string()));
        }

        let previous = self.tasks.get(session_id);
        let existing_live = previous.clone().filter(|t| !t.done());
        let task = match existing_live {
            Some(t) => t,
            None => {
                // A finished Task's output stream still holds this session's
                // event-id sequence (spec §8 invariant 1: ids are monotonic
                // *within a session*, not just within one Task's lifetime).
                // Reuse it across recreation instead of starting a new
                // stream at id 1, which would collide with already-persisted
                // event ids and break SSE resumability (invariant 7).
                let (input_stream, output_stream): (Arc<dyn Stream>, Arc<dyn Stream>) = match previous {
                    Some(prev) => (Arc::clone(&prev.input), Arc::clone(&prev.output)),
                    None => (Arc::new(stupid_queue::InMemoryStream::new()), Arc::new(stupid_queue::InMemoryStream::new())),
                };
                let task = self.tasks.create_or_get(session_id, input_stream, output_stream);
                self.sessions.set_task(session_id, Some(task.id.clone()))?;
                task
            }
        };

        task.input.put(serde_json::to_value(&input).unwrap()).await?;

        let worker_self = self.clone();
        let worker_session_id = session_id.to_string();
        task.invoke(move |task| {
            tokio::spawn(async move {
                if let Err(e) = worker_self.drive_task(&worker_session_id, Arc::clone(&task)).await {
                    error!(session_id = %worker_session_id, error = %e, "task worker failed");
                    let _ = task
                        .output
                        .put(serde_json::to_value(&EventPayload::Error { message: e.to_string() }).unwrap())
                        .await;
                }
                task.mark_done();
            })
        });

        Ok(task)
    }

    pub fn cancel(&self, session_id: &str) {
        self.tasks.destroy(session_id);
    }

    /// Drain every currently-queued input message for this task, running
    /// each through a fresh `Flow` built against the session's sandbox and
    /// tool registry, until the input is empty or the task is cancelled.
    async fn drive_task(&self, session_id: &str, task: Arc<Task>) -> Result<(), RunnerError> {
        let mut session = self.sessions.get(session_id)?.ok_or_else(|| RunnerError::SessionNotFound(session_id.to_string()))?;

        let sandbox = Arc::new(self.ensure_sandbox(session_id, &mut session).await?);
        let provider: Arc<dyn ToolAwareLlmProvider> = stupid_llm::create_provider(&self.config.llm)?.into();
        let tools = Arc::new(self.build_tool_registry(Arc::clone(&sandbox)).await);
        let loop_config = AgentLoopConfig {
            max_iterations: self.config.agent.max_iterations,
            max_retries: self.config.agent.max_retries,
            ..AgentLoopConfig::default()
        };

        let planner = Planner::new(Arc::clone(&provider), Arc::clone(&tools), loop_config.clone());
        let react = ReAct::new(provider, tools, loop_config);
        let mut flow = Flow::new(planner, react);

        // A Task's worker exits (and is marked done) as soon as its input
        // stream drains, which can happen mid-conversation (e.g. right after
        // a `wait`). The Flow built above is therefore fresh every time this
        // function runs; restore whatever state the previous invocation left
        // in the Session so plan/memory continuity (spec §8 invariant 6)
        // survives the Task being recreated.
        if let Some(memory) = session.memories.get("planner") {
            *flow.planner_memory_mut() = memory.clone();
        }
        if let Some(memory) = session.memories.get("react") {
            *flow.react_memory_mut() = memory.clone();
        }
        flow.set_plan(session.current_plan.clone());

        loop {
            if task.is_cancelled() {
                info!(session_id = %session_id, "task cancelled, stopping drain");
                return Ok(());
            }
            let Some(entry) = task.input.pop().await? else {
                return Ok(());
            };
            let mut input: ChatInput = match serde_json::from_value(entry.data) {
                Ok(v) => v,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "dropping malformed chat input");
                    continue;
                }
            };

            let status = session.status;
            self.sessions.set_status(session_id, SessionStatus::Running)?;

            self.sync_attachments_to_sandbox(session_id, &sandbox, &mut input.attachments).await;

            let run_result = flow.run(status, &input.message, &input.attachments).await;

            self.sessions.set_memory(session_id, "planner", flow.planner_memory().clone())?;
            self.sessions.set_memory(session_id, "react", flow.react_memory().clone())?;
            let persisted_plan = flow.plan().filter(|p| p.status != crate::plan::PlanStatus::Completed).cloned();
            self.sessions.set_current_plan(session_id, persisted_plan)?;

            match run_result {
                Ok(events) => {
                    let mut next_status = SessionStatus::Completed;
                    for event in events {
                        if matches!(event, EventPayload::Wait) {
                            next_status = SessionStatus::Waiting;
                        }
                        self.emit(session_id, &task, event).await?;
                    }
                    self.sessions.set_status(session_id, next_status)?;
                }
                Err(e) => {
                    self.emit(session_id, &task, EventPayload::Error { message: e.to_string() }).await?;
                    self.sessions.set_status(session_id, SessionStatus::Completed)?;
                }
            }
            session = self.sessions.get(session_id)?.ok_or_else(|| RunnerError::SessionNotFound(session_id.to_string()))?;
        }
    }

    /// Sync a chat turn's attachments into the sandbox before the Flow sees
    /// them (spec §4.8: "sync attachments into the sandbox, run the Flow";
    /// SPEC_FULL §11, grounded on `agent_task_runner.py`'s
    /// `_sync_file_to_sandbox`/`_sync_message_attachments_to_sandbox`). Each
    /// attachment lands at a fixed `/home/ubuntu/upload/<name>` path; the
    /// `filepath` is assigned even if `FileStorage` has no bytes for it (no
    /// object-store adapter is wired up per spec §1's Non-goal), so shell
    /// and file tools that reference it by path still resolve.
    async fn sync_attachments_to_sandbox(&self, session_id: &str, sandbox: &SandboxSession, attachments: &mut [File]) {
        for file in attachments.iter_mut() {
            let filepath = format!("/home/ubuntu/upload/{}", file.name);
            match self.file_storage.download(file).await {
                Ok(Some(bytes)) => match sandbox.file_upload(&bytes, &filepath, Some(&file.name)).await {
                    Ok(result) if result.success => {
                        file.size = bytes.len() as u64;
                    }
                    Ok(result) => {
                        warn!(session_id = %session_id, file = %file.name, message = ?result.message, "sandbox rejected attachment upload");
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, file = %file.name, error = %e, "failed to upload attachment to sandbox");
                    }
                },
                Ok(None) => {
                    warn!(session_id = %session_id, file = %file.name, "no bytes available for attachment, assigning sandbox path only");
                }
                Err(e) => {
                    warn!(session_id = %session_id, file = %file.name, error = %e, "file storage lookup failed for attachment");
                }
            }
            file.filepath = Some(filepath);
            if let Err(e) = self.sessions.add_file(session_id, file.clone()) {
                warn!(session_id = %session_id, file = %file.name, error = %e, "failed to persist synced attachment to session");
            }
        }
    }

    async fn emit(&self, session_id: &str, task: &Task, payload: EventPayload) -> Result<(), RunnerError> {
        let id = task.output.put(serde_json::to_value(&payload).unwrap()).await?;
        self.sessions.append_event(session_id, id, chrono::Utc::now(), payload)?;
        Ok(())
    }

    async fn ensure_sandbox(&self, session_id: &str, session: &mut Session) -> Result<SandboxSession, RunnerError> {
        if let Some(id) = &session.sandbox_id {
            if let Ok(s) = SandboxSession::get(id, &self.config.sandbox).await {
                return Ok(s);
            }
            warn!(session_id = %session_id, sandbox_id = %id, "stale sandbox id, reprovisioning");
        }
        let sandbox = SandboxSession::create(&self.config.sandbox).await?;
        self.sessions.set_sandbox(session_id, sandbox.id().to_string())?;
        session.sandbox_id = Some(sandbox.id().to_string());
        Ok(sandbox)
    }

    async fn build_tool_registry(&self, sandbox: Arc<SandboxSession>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let _ = registry.register(ShellExecTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(ShellViewTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(ShellWaitTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(ShellWriteTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(ShellKillTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserViewTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserNavigateTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserClickTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserInputTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserScrollTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(BrowserScreenshotTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileReadTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileWriteTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileReplaceTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileSearchTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileFindTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileExistsTool::new(Arc::clone(&sandbox)));
        let _ = registry.register(FileDeleteTool::new(sandbox));
        let _ = registry.register(AskUserTool);

        if let Some(search) = &self.config.search {
            let engine = HttpSearchEngine::new(search.endpoint.clone(), search.api_key.clone());
            let _ = registry.register(SearchWebTool::new(engine, self.config.agent.max_search_results));
        }

        let mut mcp = McpToolbox::new();
        if let Err(e) = mcp.initialize(&self.config.mcp_servers).await {
            warn!(error = %e, "mcp toolbox initialization failed");
        }
        let mcp = Arc::new(mcp);
        for schema in mcp.schemas().await {
            let _ = registry.register(McpToolboxTool::new(schema, Arc::clone(&mcp)));
        }

        let mut a2a = A2aToolbox::new();
        if let Err(e) = a2a.initialize(&self.config.a2a_servers).await {
            warn!(error = %e, "a2a toolbox initialization failed");
        }
        let a2a = Arc::new(a2a);
        let _ = registry.register(A2aListAgentsTool::new(Arc::clone(&a2a)));
        let _ = registry.register(A2aCallAgentTool::new(a2a));

        registry
    }
}
