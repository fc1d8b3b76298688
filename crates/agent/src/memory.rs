//! Per-agent Memory (spec §3, §4.4): the ordered chat buffer fed to the LLM.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::File;

pub const ASK_USER_FUNCTION: &str = "message_ask_user";

/// The follow-up chat message bridged into a paused `message_ask_user` tool
/// call. Serialized as the tool-result `content` by `roll_back_for_message`
/// (spec §3, §8 invariant 6, §11's bridging detail — grounded in the
/// original's `BaseAgent.roll_back`, which calls `message.model_dump_json()`
/// rather than threading the raw text through).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgedMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<File>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Vendor-specific reasoning/thinking blocks some providers attach to an
    /// assistant message. `compact()` strips this (spec §3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: None, tool_call_id: None, function_name: None, reasoning: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: None, tool_call_id: None, function_name: None, reasoning: None }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Option<Vec<ToolCallRef>>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls, tool_call_id: None, function_name: None, reasoning: None }
    }

    pub fn tool(tool_call_id: impl Into<String>, function_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            function_name: Some(function_name.into()),
            reasoning: None,
        }
    }

    /// The tool this message's trailing assistant turn called, if the first
    /// (and only, per spec §4.5's "keep only the first tool_call") one is
    /// `message_ask_user`.
    fn asks_user(&self) -> Option<&ToolCallRef> {
        self.tool_calls.as_ref().and_then(|calls| calls.first()).filter(|c| c.name == ASK_USER_FUNCTION)
    }
}

/// Ordered conversation slice for one agent instance within one session
/// (spec §4.4: "each agent instance owns its Memory; no cross-agent
/// mutation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    system_prompt: String,
    messages: Vec<Message>,
}

impl Memory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), messages: Vec::new() }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append `msg`. On first use, prepends the agent's system prompt as a
    /// single `system` message (spec §3, §4.5 step 1).
    pub fn append(&mut self, msg: Message) {
        if self.messages.is_empty() && msg.role != Role::System {
            self.messages.push(Message::system(self.system_prompt.clone()));
        }
        self.messages.push(msg);
    }

    /// For tool messages whose `function_name` is `browser_view` or
    /// `browser_navigate`, replace `content` with a sentinel and strip
    /// vendor reasoning fields everywhere (spec §3, invariant 5 in §8).
    pub fn compact(&mut self) {
        for msg in &mut self.messages {
            msg.reasoning = None;
            if msg.role == Role::Tool {
                if let Some(name) = &msg.function_name {
                    if name == "browser_view" || name == "browser_navigate" {
                        msg.content = "(removed)".to_string();
                    }
                }
            }
        }
    }

    /// Drop the last message (spec §3, invariant 4 in §8: its own inverse
    /// on any trailing non-tool-call assistant message).
    pub fn rollback(&mut self) {
        self.messages.pop();
    }

    /// Bridge a pause/resume turn: if the trailing assistant message's first
    /// tool call is `message_ask_user`, append a synthetic tool-result
    /// message whose content is the JSON serialization of `{message,
    /// attachments}` rather than dropping anything (spec §3, §4.7,
    /// invariant 6 in §8: "content = serialize(M)"); otherwise behaves like
    /// `rollback()`.
    pub fn roll_back_for_message(&mut self, m: &str, attachments: &[File]) {
        let bridge = self
            .messages
            .last()
            .filter(|msg| msg.role == Role::Assistant)
            .and_then(|msg| msg.asks_user().cloned());

        match bridge {
            Some(call) => {
                let serialized = serde_json::to_string(&BridgedMessage {
                    message: m.to_string(),
                    attachments: attachments.to_vec(),
                })
                .expect("BridgedMessage is always serializable");
                self.messages.push(Message::tool(call.id, call.name, serialized));
            }
            None => self.rollback(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_append_inserts_system_message() {
        let mut mem = Memory::new("you are an agent");
        mem.append(Message::user("hi"));
        assert_eq!(mem.messages()[0].role, Role::System);
        assert_eq!(mem.messages()[0].content, "you are an agent");
        assert_eq!(mem.messages()[1].role, Role::User);
    }

    #[test]
    fn system_message_not_duplicated_if_caller_provides_one() {
        let mut mem = Memory::new("ignored");
        mem.append(Message::system("custom"));
        mem.append(Message::user("hi"));
        assert_eq!(mem.messages().len(), 2);
    }

    #[test]
    fn compact_replaces_browser_view_and_navigate_content() {
        let mut mem = Memory::new("sp");
        mem.append(Message::user("go"));
        mem.append(Message::tool("c1", "browser_view", "<huge markdown dump>"));
        mem.append(Message::tool("c2", "shell_exec", "ls output"));
        mem.compact();
        assert_eq!(mem.messages()[2].content, "(removed)");
        assert_eq!(mem.messages()[3].content, "ls output");
    }

    #[test]
    fn rollback_drops_last_message() {
        let mut mem = Memory::new("sp");
        mem.append(Message::user("hi"));
        mem.append(Message::assistant("hello", None));
        mem.rollback();
        assert_eq!(mem.messages().len(), 2); // system + user
    }

    #[test]
    fn roll_back_for_message_bridges_ask_user_pause() {
        let mut mem = Memory::new("sp");
        mem.append(Message::user("plan a trip"));
        mem.append(Message::assistant(
            "",
            Some(vec![ToolCallRef { id: "call_1".into(), name: ASK_USER_FUNCTION.into(), arguments: json!({"text": "which city?"}) }]),
        ));
        mem.roll_back_for_message("Paris", &[]);
        let last = mem.messages().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
        let parsed: BridgedMessage = serde_json::from_str(&last.content).unwrap();
        assert_eq!(parsed.message, "Paris");
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn roll_back_for_message_serializes_attachments() {
        let mut mem = Memory::new("sp");
        mem.append(Message::assistant(
            "",
            Some(vec![ToolCallRef { id: "call_1".into(), name: ASK_USER_FUNCTION.into(), arguments: json!({}) }]),
        ));
        let file = File { id: "f1".into(), name: "plan.pdf".into(), ..Default::default() };
        mem.roll_back_for_message("here's my plan", std::slice::from_ref(&file));
        let last = mem.messages().last().unwrap();
        let parsed: BridgedMessage = serde_json::from_str(&last.content).unwrap();
        assert_eq!(parsed.message, "here's my plan");
        assert_eq!(parsed.attachments.len(), 1);
        assert_eq!(parsed.attachments[0].id, "f1");
    }

    #[test]
    fn roll_back_for_message_falls_back_to_rollback_without_ask_user() {
        let mut mem = Memory::new("sp");
        mem.append(Message::user("hi"));
        mem.append(Message::assistant("hello", None));
        mem.roll_back_for_message("new message", &[]);
        assert_eq!(mem.messages().len(), 2);
    }
}
