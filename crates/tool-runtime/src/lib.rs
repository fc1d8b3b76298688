pub mod conversation;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod tool;
pub mod tools;

pub use provider::ToolAwareLlmProvider;
pub use registry::ToolRegistry;
pub use stream::StreamEvent;
pub use tool::{EchoTool, Tool, ToolCall, ToolDefinition, ToolResult};
pub use tools::{
    AskUserTool, BrowserClickTool, BrowserInputTool, BrowserNavigateTool, BrowserScreenshotTool,
    BrowserScrollTool, BrowserViewTool, FileDeleteTool, FileExistsTool, FileFindTool,
    FileReadTool, FileReplaceTool, FileSearchTool, FileWriteTool, HttpSearchEngine, SearchEngine,
    SearchWebTool, ShellExecTool, ShellKillTool, ShellViewTool, ShellWaitTool, ShellWriteTool,
};
