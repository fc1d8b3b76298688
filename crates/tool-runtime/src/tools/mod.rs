//! Built-in tool implementations for the agentic runtime.
//!
//! Most tools are thin wrappers around a `SandboxSession`/`Browser` method:
//! the agent loop never touches the local OS directly, only the remote
//! sandbox its session is bound to.

pub mod browser;
pub mod file;
pub mod message;
pub mod search;
pub mod shell;

pub use browser::{
    BrowserClickTool, BrowserInputTool, BrowserNavigateTool, BrowserScreenshotTool,
    BrowserScrollTool, BrowserViewTool,
};
pub use file::{
    FileDeleteTool, FileExistsTool, FileFindTool, FileReadTool, FileReplaceTool, FileSearchTool,
    FileWriteTool,
};
pub use message::AskUserTool;
pub use search::{HttpSearchEngine, SearchEngine, SearchWebTool};
pub use shell::{ShellExecTool, ShellKillTool, ShellViewTool, ShellWaitTool, ShellWriteTool};
