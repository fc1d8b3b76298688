//! Planner agent (spec §4.6, C8): builds and updates the `Plan`.

use std::sync::Arc;

use serde::Deserialize;
use stupid_tool_runtime::registry::ToolRegistry;
use stupid_tool_runtime::provider::ToolAwareLlmProvider;
use stupid_tool_runtime::tool::ToolContext;

use crate::agent_loop::{AgentLoop, AgentLoopConfig, AgentLoopError, LoopEvent};
use crate::attachment::File;
use crate::json_util::extract_json;
use crate::memory::Memory;
use crate::plan::{Plan, Step};

pub const DEFAULT_PLANNER_SYSTEM_PROMPT: &str = "You are a planning agent. Given a user request, break it into an \
ordered list of concrete steps. Respond with a single JSON object: \
{\"title\": string, \"goal\": string, \"language\": string, \"steps\": [string, ...]}.";

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Loop(#[from] AgentLoopError),
    #[error("planner returned no final message")]
    NoFinalMessage,
    #[error(transparent)]
    Parse(#[from] crate::json_util::JsonExtractError),
}

#[derive(Debug, Deserialize)]
struct CreatePlanResponse {
    title: String,
    goal: String,
    #[serde(default)]
    language: String,
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePlanResponse {
    steps: Vec<String>,
}

pub struct Planner {
    inner: AgentLoop,
    memory: Memory,
}

impl Planner {
    pub fn new(provider: Arc<dyn ToolAwareLlmProvider>, tools: Arc<ToolRegistry>, config: AgentLoopConfig) -> Self {
        Self::with_system_prompt(provider, tools, config, DEFAULT_PLANNER_SYSTEM_PROMPT)
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

    /// `Planner.create_plan(message)` (spec §4.6): emits a `plan{CREATED}`
    /// via the returned `Plan` (status is `Created` on construction).
    pub async fn create_plan(
        &mut self,
        message: &str,
        attachments: &[File],
        ctx: &ToolContext,
    ) -> Result<(Plan, Vec<LoopEvent>), PlannerError> {
        let prompt = render_create_prompt(message, attachments);
        let events = self.inner.run(&prompt, &mut self.memory, ctx).await?;
        let final_text = last_message_text(&events).ok_or(PlannerError::NoFinalMessage)?;
        let parsed: CreatePlanResponse = extract_json(&final_text)?;

        let steps = parsed.steps.into_iter().map(Step::new).collect();
        let mut plan = Plan::new(parsed.title, parsed.goal, steps);
        if !parsed.language.is_empty() {
            plan.language = parsed.language;
        }
        Ok((plan, events))
    }

    /// `Planner.update_plan(plan, just_finished_step)` (spec §4.6): the
    /// response replaces everything from the first pending step onward,
    /// preserving the completed prefix (`Plan::apply_update`, invariant 3).
    pub async fn update_plan(
        &mut self,
        plan: &mut Plan,
        just_finished_step: &Step,
        ctx: &ToolContext,
    ) -> Result<Vec<LoopEvent>, PlannerError> {
        let prompt = render_update_prompt(plan, just_finished_step);
        let events = self.inner.run(&prompt, &mut self.memory, ctx).await?;
        let final_text = last_message_text(&events).ok_or(PlannerError::NoFinalMessage)?;
        let parsed: UpdatePlanResponse = extract_json(&final_text)?;

        plan.apply_update(parsed.steps.into_iter().map(Step::new).collect());
        Ok(events)
    }
}

fn last_message_text(events: &[LoopEvent]) -> Option<String> {
    events.iter().rev().find_map(|e| match e {
        LoopEvent::Message { content } => Some(content.clone()),
        _ => None,
    })
}

fn render_create_prompt(message: &str, attachments: &[File]) -> String {
    if attachments.is_empty() {
        return message.to_string();
    }
    let paths: Vec<&str> = attachments.iter().filter_map(|f| f.filepath.as_deref()).collect();
    format!("{message}\n\nAttachments:\n{}", paths.join("\n"))
}

fn render_update_prompt(plan: &Plan, just_finished_step: &Step) -> String {
    format!(
        "The step \"{}\" just finished (success={}).\nCurrent plan:\n{}\n\nReturn the remaining steps as JSON.",
        just_finished_step.description,
        just_finished_step.success,
        serde_json::to_string(plan).unwrap_or_default(),
    )
}
