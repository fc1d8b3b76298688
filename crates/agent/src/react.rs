//! ReAct executing agent (spec §4.6, C8): executes one plan step and
//! summarizes at the end of a run.

use std::sync::Arc;

use serde::Deserialize;
use stupid_tool_runtime::registry::ToolRegistry;
use stupid_tool_runtime::provider::ToolAwareLlmProvider;
use stupid_tool_runtime::tool::ToolContext;

use crate::agent_loop::{AgentLoop, AgentLoopConfig, AgentLoopError, LoopEvent};
use crate::attachment::File;
use crate::event::MessageRole;
use crate::json_util::extract_json;
use crate::memory::{Memory, ASK_USER_FUNCTION};
use crate::plan::{Step, StepPatch, StepStatus};

pub const DEFAULT_REACT_SYSTEM_PROMPT: &str = "You are an execution agent. Carry out the given step using the \
available tools, one tool call at a time. When the step is complete, respond with a single JSON object: \
{\"success\": bool, \"result\": string, \"attachments\": []}.";

pub const DEFAULT_SUMMARY_SYSTEM_PROMPT: &str = "Summarize the work performed in this conversation for the user. \
Respond with a single JSON object: {\"message\": string, \"attachments\": []}.";

#[derive(Debug, thiserror::Error)]
pub enum ReActError {
    #[error(transparent)]
    Loop(#[from] AgentLoopError),
    #[error(transparent)]
    Parse(#[from] crate::json_util::JsonExtractError),
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    message: String,
    #[serde(default)]
    attachments: Vec<File>,
}

/// Session-facing events a step execution or summary produces; the flow
/// controller (§4.7) turns these into `EventPayload`s with surrounding
/// plan/step context and writes them to the Task's output stream.
#[derive(Debug, Clone)]
pub enum ReActEvent {
    StepRunning { step: Step },
    ToolCalling { tool_call_id: String, function_name: String, function_args: serde_json::Value },
    ToolCalled { tool_call_id: String, function_name: String, function_result: serde_json::Value, tool_content: Option<serde_json::Value> },
    Message { role: MessageRole, content: String },
    Wait,
    StepCompleted { step: Step },
    StepFailed { step: Step },
    Summary { message: String, attachments: Vec<File> },
}

pub struct ReAct {
    inner: AgentLoop,
    memory: Memory,
}

impl ReAct {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>, tools: Arc<ToolRegistry>, config: AgentLoopConfig) -> Self {
        Self::with_system_prompt(provider, tools, config, DEFAULT_REACT_SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(
        provider: Arc<dyn ToolAwareLlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentLoopConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self { inner: AgentLoop::new(provider, tools, config), memory: Memory::new(system_prompt) }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// `ReAct.execute_step(plan, step, message)` (spec §4.6). Mutates `step`
    /// in place (status, result, error) and returns the events produced. A
    /// `message_ask_user` pause leaves `step.status == Running` — the
    /// caller (Flow) must not advance past it.
    pub async fn execute_step(&mut self, step: &mut Step, plan_goal: &str) -> Result<Vec<ReActEvent>, ReActError> {
        step.status = StepStatus::Running;
        let mut out = vec![ReActEvent::StepRunning { step: step.clone() }];

        let prompt = format!("Goal: {plan_goal}\nStep: {}", step.description);
        let loop_events = self.inner.run(&prompt, &mut self.memory, &tool_context()).await?;
        self.apply_loop_events(step, loop_events, &mut out)?;
        Ok(out)
    }

    /// Resume a previously-paused step: the new user message was already
    /// bridged into memory via `Memory::roll_back_for_message` by the flow
    /// controller, so this just continues driving the loop rather than
    /// starting a fresh `run`.
    pub async fn resume_step(&mut self, step: &mut Step) -> Result<Vec<ReActEvent>, ReActError> {
        let mut out = Vec::new();
        let loop_events = self.inner.drive(&mut self.memory, &tool_context()).await?;
        self.apply_loop_events(step, loop_events, &mut out)?;
        Ok(out)
    }

    fn apply_loop_events(&mut self, step: &mut Step, loop_events: Vec<LoopEvent>, out: &mut Vec<ReActEvent>) -> Result<(), ReActError> {
        for le in loop_events {
            match le {
                LoopEvent::ToolCalling { tool_call_id, function_name, function_args } => {
                    if function_name == ASK_USER_FUNCTION {
                        let text = function_args.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                        out.push(ReActEvent::Message { role: MessageRole::Assistant, content: text });
                    } else {
                        out.push(ReActEvent::ToolCalling { tool_call_id, function_name, function_args });
                    }
                }
                LoopEvent::ToolCalled { tool_call_id, function_name, function_result, tool_content } => {
                    out.push(ReActEvent::ToolCalled { tool_call_id, function_name, function_result, tool_content });
                }
                LoopEvent::AskUserPaused { .. } => {
                    // CALLING's message event was already emitted above as
                    // part of the ToolCalling branch when the question
                    // surfaced; CALLED means stop here (spec §4.6).
                    out.push(ReActEvent::Wait);
                    return Ok(());
                }
                LoopEvent::Message { content } => {
                    let patch: StepPatch = extract_json(&content)?;
                    step.success = patch.success;
                    step.result = patch.result.clone();
                    step.attachments = patch.attachments;
                    step.status = if patch.success { StepStatus::Completed } else { StepStatus::Failed };
                    if patch.success {
                        out.push(ReActEvent::StepCompleted { step: step.clone() });
                    } else {
                        out.push(ReActEvent::StepFailed { step: step.clone() });
                    }
                    out.push(ReActEvent::Message { role: MessageRole::Assistant, content: step.result.clone().unwrap_or_default() });
                }
                LoopEvent::Error { message } => {
                    step.status = StepStatus::Failed;
                    step.error = Some(message);
                    out.push(ReActEvent::StepFailed { step: step.clone() });
                }
            }
        }
        Ok(())
    }

    /// `ReAct.summarize()` (spec §4.6): issues a summarizing prompt over
    /// whatever is currently in memory and emits the final `message`.
    pub async fn summarize(&mut self) -> Result<Vec<ReActEvent>, ReActError> {
        let loop_events = self.inner.run("Summarize the completed work.", &mut self.memory, &tool_context()).await?;
        let final_text = loop_events
            .iter()
            .rev()
            .find_map(|e| match e {
                LoopEvent::Message { content } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let parsed: SummaryResponse = extract_json(&final_text)?;
        Ok(vec![ReActEvent::Summary { message: parsed.message, attachments: parsed.attachments }])
    }
}

/// The step's tool context; the working directory is sandbox-relative and
/// unused directly (tools reach the sandbox through their own handles), kept
/// only so `Tool::execute`'s signature is satisfied.
fn tool_context() -> ToolContext {
    tool_context_for_planner()
}

/// Same placeholder context, shared with the Planner (spec §4.6): creating
/// and updating a plan never touches tools directly either.
pub fn tool_context_for_planner() -> ToolContext {
    ToolContext { working_directory: std::path::PathBuf::from("/") }
}
