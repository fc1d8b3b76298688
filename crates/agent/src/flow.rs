//! Flow controller (spec §4.7, C9): the Plan→Execute→Update→Summarize state
//! machine, with resumption keyed on the Session's status at invocation.

use crate::attachment::File;
use crate::event::{EventPayload, MessageRole, ToolEventStatus};
use crate::plan::{Plan, Step};
use crate::planner::{Planner, PlannerError};
use crate::react::{ReAct, ReActError, ReActEvent};
use crate::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Planning,
    Executing,
    Updating,
    Summarizing,
    Completed,
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    React(#[from] ReActError),
    #[error("flow invoked while a plan-less session was neither PENDING nor RUNNING")]
    NoActivePlan,
}

pub struct Flow {
    planner: Planner,
    react: ReAct,
    state: FlowState,
    plan: Option<Plan>,
    finished_step: Option<Step>,
}

impl Flow {
    pub fn new(planner: Planner, react: ReAct) -> Self {
        Self { planner, react, state: FlowState::Idle, plan: None, finished_step: None }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// Restore a plan a previous Task invocation left in progress (spec
    /// §4.8: Tasks are recreated between turns, so the Flow itself does not
    /// outlive one drive loop — the Runner restores this from the Session
    /// before calling `run` again).
    pub fn set_plan(&mut self, plan: Option<Plan>) {
        self.plan = plan;
    }

    pub fn planner_memory(&self) -> &crate::memory::Memory {
        self.planner.memory()
    }

    pub fn planner_memory_mut(&mut self) -> &mut crate::memory::Memory {
        self.planner.memory_mut()
    }

    pub fn react_memory(&self) -> &crate::memory::Memory {
        self.react.memory()
    }

    pub fn react_memory_mut(&mut self) -> &mut crate::memory::Memory {
        self.react.memory_mut()
    }

    /// Drive one turn of the flow to its next suspension point: either
    /// `wait` (step paused on `message_ask_user`) or the terminal
    /// `plan{COMPLETED}` + `done` pair. Resumption rule per spec §4.7:
    /// PENDING starts fresh in PLANNING; RUNNING re-plans after rolling back
    /// both agents' memories to a pre-turn state; WAITING continues
    /// EXECUTING with the message bridged into the paused step.
    pub async fn run(&mut self, session_status: SessionStatus, message: &str, attachments: &[File]) -> Result<Vec<EventPayload>, FlowError> {
        let mut resuming_waiting_step = false;
        match session_status {
            SessionStatus::Pending | SessionStatus::Completed => {
                self.state = FlowState::Planning;
            }
            SessionStatus::Running => {
                self.planner.memory_mut().roll_back_for_message(message, attachments);
                self.react.memory_mut().roll_back_for_message(message, attachments);
                self.state = FlowState::Planning;
            }
            SessionStatus::Waiting => {
                self.react.memory_mut().roll_back_for_message(message, attachments);
                self.state = FlowState::Executing;
                resuming_waiting_step = true;
            }
        }

        let mut events = Vec::new();
        loop {
            match self.state {
                FlowState::Idle => break,
                FlowState::Planning => {
                    let (plan, _) = self.planner.create_plan(message, attachments, &crate::react::tool_context_for_planner()).await?;
                    events.push(EventPayload::Title { title: plan.title.clone() });
                    events.push(EventPayload::Plan { plan: plan.clone() });
                    let empty = plan.is_empty();
                    self.plan = Some(plan);
                    self.state = if empty { FlowState::Completed } else { FlowState::Executing };
                }
                FlowState::Executing => {
                    let plan = self.plan.as_mut().ok_or(FlowError::NoActivePlan)?;
                    let Some(step) = plan.get_next_step_mut() else {
                        self.state = FlowState::Summarizing;
                        continue;
                    };
                    let react_events = if resuming_waiting_step {
                        resuming_waiting_step = false;
                        self.react.resume_step(step).await?
                    } else {
                        let goal = plan.goal.clone();
                        self.react.execute_step(step, &goal).await?
                    };

                    let mut waiting = false;
                    let mut finished = None;
                    for re in react_events {
                        match re {
                            ReActEvent::StepRunning { step } => events.push(EventPayload::Step { step }),
                            ReActEvent::ToolCalling { tool_call_id, function_name, function_args } => {
                                events.push(EventPayload::Tool {
                                    tool_name: classify_tool_name(&function_name).to_string(),
                                    function_name,
                                    function_args,
                                    function_result: None,
                                    tool_content: None,
                                    tool_call_id,
                                    status: ToolEventStatus::Calling,
                                });
                            }
                            ReActEvent::ToolCalled { tool_call_id, function_name, function_result, tool_content } => {
                                events.push(EventPayload::Tool {
                                    tool_name: classify_tool_name(&function_name).to_string(),
                                    function_args: serde_json::Value::Null,
                                    function_name,
                                    function_result: Some(function_result),
                                    tool_content,
                                    tool_call_id,
                                    status: ToolEventStatus::Called,
                                });
                            }
                            ReActEvent::Message { role, content } => {
                                events.push(EventPayload::Message { role, message: content, attachments: vec![] });
                            }
                            ReActEvent::Wait => {
                                events.push(EventPayload::Wait);
                                waiting = true;
                            }
                            ReActEvent::StepCompleted { step } | ReActEvent::StepFailed { step } => {
                                finished = Some(step);
                            }
                            ReActEvent::Summary { .. } => {}
                        }
                    }

                    if waiting {
                        return Ok(events);
                    }
                    self.finished_step = finished;
                    self.state = FlowState::Updating;
                }
                FlowState::Updating => {
                    let finished = self.finished_step.take().ok_or(FlowError::NoActivePlan)?;
                    self.react.memory_mut().compact();
                    let plan = self.plan.as_mut().ok_or(FlowError::NoActivePlan)?;
                    self.planner.update_plan(plan, &finished, &crate::react::tool_context_for_planner()).await?;
                    events.push(EventPayload::Plan { plan: plan.clone() });
                    self.state = FlowState::Executing;
                }
                FlowState::Summarizing => {
                    for re in self.react.summarize().await? {
                        if let ReActEvent::Summary { message, attachments } = re {
                            events.push(EventPayload::Message { role: MessageRole::Assistant, message, attachments });
                        }
                    }
                    self.state = FlowState::Completed;
                }
                FlowState::Completed => {
                    if let Some(plan) = self.plan.as_mut() {
                        plan.mark_completed();
                        events.push(EventPayload::Plan { plan: plan.clone() });
                    }
                    events.push(EventPayload::Done);
                    self.state = FlowState::Idle;
                    break;
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stupid_tool_runtime::provider::mock::MockLlmProvider;
    use stupid_tool_runtime::registry::ToolRegistry;
    use stupid_tool_runtime::stream::{StopReason, StreamEvent};

    use crate::agent_loop::AgentLoopConfig;
    use crate::memory::ASK_USER_FUNCTION;
    use crate::plan::PlanStatus;

    fn text_response(json: &str) -> Vec<StreamEvent> {
        vec![StreamEvent::TextDelta { text: json.to_string() }, StreamEvent::MessageEnd { stop_reason: StopReason::EndTurn }]
    }

    fn new_flow(provider: Arc<MockLlmProvider>) -> Flow {
        let tools = Arc::new(ToolRegistry::new());
        let config = AgentLoopConfig::default();
        let planner = Planner::new(Arc::clone(&provider) as _, Arc::clone(&tools), config.clone());
        let react = ReAct::new(provider as _, tools, config);
        Flow::new(planner, react)
    }

    /// End-to-end spec §8 invariant 6 / S3: a step that pauses on
    /// `message_ask_user` mid-turn, then resumes on the next chat message
    /// using state restored from a *second*, freshly built `Flow` — mirrors
    /// the Runner rebuilding Planner/ReAct/Flow from scratch every time a
    /// Task's worker is recreated between chat turns.
    #[tokio::test]
    async fn ask_user_pause_then_resume_across_separately_built_flows() {
        let provider = Arc::new(MockLlmProvider::new());
        // MockLlmProvider.queue_response pushes and pop()s from the back, so
        // responses are queued in reverse of the order they are consumed:
        // the planner's create_plan call happens before react's ask_user
        // call, so the ask_user response is queued first.
        provider.queue_response(vec![
            StreamEvent::ToolCallStart { id: "call_1".into(), name: ASK_USER_FUNCTION.into() },
            StreamEvent::ToolCallDelta { id: "call_1".into(), arguments_delta: r#"{"text":"which city?"}"#.into() },
            StreamEvent::ToolCallEnd { id: "call_1".into() },
            StreamEvent::MessageEnd { stop_reason: StopReason::ToolUse },
        ]);
        provider.queue_response(text_response(
            r#"{"title":"Trip planning","goal":"plan a trip","language":"en","steps":["ask which city"]}"#,
        ));

        let mut flow1 = new_flow(Arc::clone(&provider));
        let turn1 = flow1.run(SessionStatus::Pending, "plan a trip", &[]).await.unwrap();
        assert!(turn1.iter().any(|e| matches!(e, EventPayload::Title { title } if title == "Trip planning")));
        assert!(turn1.iter().any(|e| matches!(e, EventPayload::Wait)));
        assert!(!turn1.iter().any(|e| matches!(e, EventPayload::Done)));

        let plan_after_turn1 = flow1.plan().cloned().expect("plan still in progress");
        assert_eq!(plan_after_turn1.status, PlanStatus::Created);
        let planner_memory = flow1.planner_memory().clone();
        let react_memory = flow1.react_memory().clone();
        assert!(!react_memory.messages().is_empty());

        // Second response queue for the resumed turn: step completes, the
        // plan update returns no further steps, then the summary.
        provider.queue_response(text_response(r#"{"message":"Booked Paris.","attachments":[]}"#));
        provider.queue_response(text_response(r#"{"steps":[]}"#));
        provider.queue_response(text_response(r#"{"success":true,"result":"Picked Paris","attachments":[]}"#));

        // A brand new Flow, as the Runner builds one every time a Task's
        // worker is recreated — state is restored from what was persisted
        // out of flow1 above instead of carried in-process.
        let mut flow2 = new_flow(provider);
        flow2.set_plan(Some(plan_after_turn1));
        *flow2.planner_memory_mut() = planner_memory;
        *flow2.react_memory_mut() = react_memory;

        let turn2 = flow2.run(SessionStatus::Waiting, "Paris", &[]).await.unwrap();
        assert!(turn2.iter().any(|e| matches!(e, EventPayload::Done)));
        assert!(turn2.iter().any(|e| matches!(e, EventPayload::Message { message, .. } if message == "Booked Paris.")));
        // No second `plan{CREATED}`/`title` — resumption continues EXECUTING
        // rather than replanning (spec §4.7 WAITING rule).
        assert!(!turn2.iter().any(|e| matches!(e, EventPayload::Title { .. })));
    }
}

fn classify_tool_name(function_name: &str) -> &'static str {
    if function_name == crate::memory::ASK_USER_FUNCTION {
        "message"
    } else if function_name.starts_with("browser_") {
        "browser"
    } else if function_name.starts_with("shell_") {
        "shell"
    } else if function_name.starts_with("file_") {
        "file"
    } else if function_name.starts_with("search_") {
        "search"
    } else if function_name.starts_with("mcp_") {
        "mcp"
    } else if function_name.starts_with("a2a_") {
        "a2a"
    } else {
        "message"
    }
}
