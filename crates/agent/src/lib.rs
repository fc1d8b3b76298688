pub mod agent_loop;
pub mod attachment;
pub mod event;
pub mod flow;
pub mod json_util;
pub mod memory;
pub mod plan;
pub mod planner;
pub mod react;
pub mod runner;
pub mod session;
pub mod task;

pub use agent_loop::{AgentLoop, AgentLoopConfig};
pub use attachment::{File, FileStorage, NullFileStorage};
pub use event::{EventPayload, MessageRole, StoredEvent, ToolEventStatus};
pub use flow::{Flow, FlowState};
pub use memory::Memory;
pub use plan::{Plan, Step};
pub use planner::Planner;
pub use react::ReAct;
pub use runner::{ChatInput, Runner, RunnerError};
pub use session::{Session, SessionStatus, SessionStore, SessionSummary};
pub use task::{Task, TaskRegistry};
