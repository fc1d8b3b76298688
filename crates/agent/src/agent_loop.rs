//! The Agent inner loop (spec §4.5, C7): LLM call <-> tool call iteration
//! with bounded retries and iterations, single serial tool call per turn.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use stupid_tool_runtime::conversation::{AssistantContent, ConversationMessage};
use stupid_tool_runtime::provider::{LlmError, ToolAwareLlmProvider};
use stupid_tool_runtime::registry::ToolRegistry;
use stupid_tool_runtime::stream::StreamEvent;
use stupid_tool_runtime::tool::{ToolCall, ToolContext, ToolResult};

use crate::memory::{Memory, Message, Role, ToolCallRef, ASK_USER_FUNCTION};

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_iterations: u32,
    pub max_retries: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self { max_iterations: 30, max_retries: 3, temperature: 0.1, max_tokens: 4096 }
    }
}

/// Events a single `AgentLoop::run` call produces, mirroring the `message`
/// and `tool{CALLING,CALLED}` payloads of spec §3 — the caller (ReAct, §4.6)
/// turns these into session `Event`s with plan/step context attached.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    Message { content: String },
    ToolCalling { tool_call_id: String, function_name: String, function_args: Value },
    ToolCalled { tool_call_id: String, function_name: String, function_result: Value, tool_content: Option<Value> },
    /// The loop called `message_ask_user` (spec §4.3, §4.6): this is a
    /// terminal event for the turn — the tool is never actually invoked, and
    /// memory is left with the trailing assistant tool-call message
    /// unresolved so `Memory::roll_back_for_message` can bridge the real
    /// answer in on resume.
    AskUserPaused { tool_call_id: String, text: String },
    Error { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AgentLoopError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
}

/// Shared by Planner and ReAct (spec §4.6: "Both are Agent-loop instances
/// with different system prompts and response formats").
pub struct AgentLoop {
    provider: Arc<dyn ToolAwareLlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentLoopConfig,
}

struct ParsedTurn {
    text: Option<String>,
    tool_calls: Vec<ToolCall>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>, tools: Arc<ToolRegistry>, config: AgentLoopConfig) -> Self {
        Self { provider, tools, config }
    }

    /// Run one query through the loop to completion: either a final
    /// `message` event, an `error` on iteration-limit exhaustion, or (by
    /// returning early with a `message` whose content is the
    /// `message_ask_user` question) a pause the caller recognizes by
    /// inspecting the last two events (spec §4.6 handles that inspection).
    pub async fn run(&self, query: &str, memory: &mut Memory, tool_context: &ToolContext) -> Result<Vec<LoopEvent>, AgentLoopError> {
        memory.append(Message::user(query));
        self.drive(memory, tool_context).await
    }

    /// Continue driving the loop from whatever state `memory` is already in
    /// (used by the flow controller on WAITING-resume, where the new user
    /// message was already bridged into memory via `roll_back_for_message`
    /// rather than appended as a fresh user turn).
    pub async fn drive(&self, memory: &mut Memory, tool_context: &ToolContext) -> Result<Vec<LoopEvent>, AgentLoopError> {
        let mut events = Vec::new();

        for _ in 0..self.config.max_iterations {
            let turn = match self.complete_turn_with_retries(memory).await {
                Ok(Some(turn)) => turn,
                Ok(None) => {
                    events.push(LoopEvent::Error { message: "empty LLM response after retries".to_string() });
                    return Ok(events);
                }
                Err(e) => return Err(e),
            };

            if turn.tool_calls.is_empty() {
                let content = turn.text.unwrap_or_default();
                memory.append(Message::assistant(content.clone(), None));
                events.push(LoopEvent::Message { content });
                return Ok(events);
            }

            // Serial tool use only: keep the first call even if the LLM
            // proposed several (spec §4.5 step 2b, §5).
            let call = turn.tool_calls.into_iter().next().expect("checked non-empty");
            let text = turn.text.unwrap_or_default();
            memory.append(Message::assistant(
                text,
                Some(vec![ToolCallRef { id: call.id.clone(), name: call.name.clone(), arguments: call.input.clone() }]),
            ));
            events.push(LoopEvent::ToolCalling {
                tool_call_id: call.id.clone(),
                function_name: call.name.clone(),
                function_args: call.input.clone(),
            });

            if call.name == ASK_USER_FUNCTION {
                let text = call.input.get("text").and_then(Value::as_str).unwrap_or_default().to_string();
                events.push(LoopEvent::AskUserPaused { tool_call_id: call.id.clone(), text });
                return Ok(events);
            }

            let result = self.invoke_tool_with_retries(&call, tool_context).await;
            events.push(LoopEvent::ToolCalled {
                tool_call_id: call.id.clone(),
                function_name: call.name.clone(),
                function_result: Value::String(result.content.clone()),
                tool_content: result.data.clone(),
            });
            memory.append(Message::tool(call.id.clone(), call.name.clone(), result.content.clone()));
        }

        events.push(LoopEvent::Error { message: "iteration limit exceeded".to_string() });
        Ok(events)
    }

    /// One LLM turn, retrying on an empty response (no text, no tool calls)
    /// up to `max_retries` with the synthetic "please continue" pair (spec
    /// §4.5 step 2a). Returns `Ok(None)` once retries are exhausted.
    async fn complete_turn_with_retries(&self, memory: &mut Memory) -> Result<Option<ParsedTurn>, AgentLoopError> {
        for attempt in 0..=self.config.max_retries {
            let turn = self.complete_turn(memory).await?;
            let empty = turn.text.as_deref().map_or(true, str::is_empty) && turn.tool_calls.is_empty();
            if !empty {
                return Ok(Some(turn));
            }
            if attempt == self.config.max_retries {
                return Ok(None);
            }
            debug!(attempt, "empty llm response, retrying with please-continue");
            memory.append(Message::assistant(String::new(), None));
            memory.append(Message::user("please continue"));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(None)
    }

    async fn complete_turn(&self, memory: &Memory) -> Result<ParsedTurn, AgentLoopError> {
        let (system_prompt, messages) = to_conversation_messages(memory);
        let tools = self.tools.list();

        let mut stream = self
            .provider
            .stream_with_tools(messages, system_prompt, tools, self.config.temperature, self.config.max_tokens)
            .await?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut current_id = String::new();
        let mut current_name = String::new();
        let mut current_args = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text } => text_parts.push(text),
                StreamEvent::ToolCallStart { id, name } => {
                    current_id = id;
                    current_name = name;
                    current_args.clear();
                }
                StreamEvent::ToolCallDelta { arguments_delta, .. } => current_args.push_str(&arguments_delta),
                StreamEvent::ToolCallEnd { .. } => {
                    tool_calls.push(ToolCall {
                        id: current_id.clone(),
                        name: current_name.clone(),
                        input: parse_tool_arguments(&current_args),
                    });
                }
                StreamEvent::MessageEnd { .. } => {}
                StreamEvent::Error { message } => warn!(message, "llm stream error"),
                StreamEvent::ToolExecutionStart { .. } | StreamEvent::ToolExecutionResult { .. } => {}
            }
        }

        let text = if text_parts.is_empty() { None } else { Some(text_parts.join("")) };
        Ok(ParsedTurn { text, tool_calls })
    }

    async fn invoke_tool_with_retries(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        for attempt in 0..=self.config.max_retries {
            match self.tools.get(&call.name) {
                None => {
                    let mut r = ToolResult::failure(format!("Unknown tool: {}", call.name));
                    r.tool_call_id = call.id.clone();
                    return r;
                }
                Some(tool) => {
                    let filtered = tool.definition().filter_args(&call.input);
                    match tool.execute(filtered, ctx).await {
                        Ok(mut r) => {
                            r.tool_call_id = call.id.clone();
                            return r;
                        }
                        Err(e) => {
                            if attempt == self.config.max_retries {
                                let mut r = ToolResult::failure(format!("Tool error: {e}"));
                                r.tool_call_id = call.id.clone();
                                return r;
                            }
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
        unreachable!()
    }
}

/// Tolerant JSON parse of accumulated streaming argument deltas (spec §4.5
/// step 2d): a partial/malformed payload degrades to an empty object rather
/// than failing the turn.
fn parse_tool_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn to_conversation_messages(memory: &Memory) -> (Option<String>, Vec<ConversationMessage>) {
    let mut system_prompt = None;
    let mut out = Vec::new();
    for msg in memory.messages() {
        match msg.role {
            Role::System => {
                if system_prompt.is_none() {
                    system_prompt = Some(msg.content.clone());
                }
            }
            Role::User => out.push(ConversationMessage::User(msg.content.clone())),
            Role::Assistant => out.push(ConversationMessage::Assistant(AssistantContent {
                text: if msg.content.is_empty() { None } else { Some(msg.content.clone()) },
                tool_calls: msg
                    .tool_calls
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall { id: tc.id, name: tc.name, input: tc.arguments })
                    .collect(),
            })),
            Role::Tool => {
                let mut result = ToolResult::success(msg.content.clone());
                result.tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                out.push(ConversationMessage::ToolResult(result));
            }
        }
    }
    (system_prompt, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stupid_tool_runtime::provider::mock::MockLlmProvider;
    use stupid_tool_runtime::tool::EchoTool;

    fn context() -> ToolContext {
        ToolContext { working_directory: std::path::PathBuf::from("/tmp") }
    }

    #[tokio::test]
    async fn simple_query_yields_one_message_event() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("hi there");
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let agent_loop = AgentLoop::new(provider, Arc::new(registry), AgentLoopConfig::default());
        let mut memory = Memory::new("you are a helpful agent");
        let events = agent_loop.run("say hi", &mut memory, &context()).await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LoopEvent::Message { content } if content == "hi there"));
        assert_eq!(memory.messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn tool_call_then_message_yields_calling_called_message() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("done");
        provider.queue_response(vec![
            StreamEvent::ToolCallStart { id: "call_1".into(), name: "echo".into() },
            StreamEvent::ToolCallDelta { id: "call_1".into(), arguments_delta: r#"{"message":"hi"}"#.into() },
            StreamEvent::ToolCallEnd { id: "call_1".into() },
            StreamEvent::MessageEnd { stop_reason: stupid_tool_runtime::stream::StopReason::ToolUse },
        ]);
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();

        let agent_loop = AgentLoop::new(provider, Arc::new(registry), AgentLoopConfig::default());
        let mut memory = Memory::new("sp");
        let events = agent_loop.run("echo hi", &mut memory, &context()).await.unwrap();

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], LoopEvent::ToolCalling { function_name, .. } if function_name == "echo"));
        assert!(matches!(&events[1], LoopEvent::ToolCalled { function_name, .. } if function_name == "echo"));
        assert!(matches!(&events[2], LoopEvent::Message { content } if content == "done"));
    }

    #[tokio::test]
    async fn ask_user_pauses_without_resolving_tool_call() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(vec![
            StreamEvent::ToolCallStart { id: "call_1".into(), name: crate::memory::ASK_USER_FUNCTION.into() },
            StreamEvent::ToolCallDelta { id: "call_1".into(), arguments_delta: r#"{"text":"which city?"}"#.into() },
            StreamEvent::ToolCallEnd { id: "call_1".into() },
            StreamEvent::MessageEnd { stop_reason: stupid_tool_runtime::stream::StopReason::ToolUse },
        ]);
        let registry = ToolRegistry::new();
        let agent_loop = AgentLoop::new(provider, Arc::new(registry), AgentLoopConfig::default());
        let mut memory = Memory::new("sp");
        let events = agent_loop.run("plan a trip", &mut memory, &context()).await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], LoopEvent::AskUserPaused { text, .. } if text == "which city?"));
        let last = memory.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.tool_calls.is_some());
    }

    #[tokio::test]
    async fn unknown_tool_produces_failed_result_and_continues() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_text("done");
        provider.queue_response(vec![
            StreamEvent::ToolCallStart { id: "call_1".into(), name: "nonexistent".into() },
            StreamEvent::ToolCallEnd { id: "call_1".into() },
            StreamEvent::MessageEnd { stop_reason: stupid_tool_runtime::stream::StopReason::ToolUse },
        ]);
        let registry = ToolRegistry::new();
        let agent_loop = AgentLoop::new(provider, Arc::new(registry), AgentLoopConfig::default());
        let mut memory = Memory::new("sp");
        let events = agent_loop.run("x", &mut memory, &context()).await.unwrap();

        assert!(matches!(&events[1], LoopEvent::ToolCalled { function_result, .. } if function_result.as_str().unwrap().contains("Unknown tool")));
    }
}
