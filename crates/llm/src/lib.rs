pub mod providers;

pub use providers::{create_provider, ClaudeToolProvider, OpenAiToolProvider};
