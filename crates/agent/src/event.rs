//! Event model (spec §3, §4.1): the tagged union written to a Task's output
//! stream and persisted to session history. `StoredEvent` is what actually
//! lives on the stream/in history; `id`/`created_at` are assigned on write,
//! never by the producer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::File;
use crate::plan::{Plan, Step};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolEventStatus {
    Calling,
    Called,
}

/// The closed variant set from spec §3. Serializes as `{"type": ..., ...}`
/// so persistence/deserialization stay total, per spec §9's "Event union"
/// design note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Plan {
        plan: Plan,
    },
    Title {
        title: String,
    },
    Step {
        step: Step,
    },
    Message {
        role: MessageRole,
        message: String,
        #[serde(default)]
        attachments: Vec<File>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        function_name: String,
        function_args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_content: Option<Value>,
        status: ToolEventStatus,
    },
    Wait,
    Done,
    Error {
        message: String,
    },
}

/// A fully assigned event: `id` and `created_at` come from the stream write,
/// never from the producer (spec §3: "Every event has `id` (assigned on
/// stream write), `created_at`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventPayload {
    /// Terminal markers that stop the chat orchestrator's read loop (spec
    /// §4.9 step 4: "stop when any of `done`, `error`, `wait` is observed").
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventPayload::Done | EventPayload::Error { .. } | EventPayload::Wait)
    }

    pub fn is_assistant_message(&self) -> bool {
        matches!(self, EventPayload::Message { role: MessageRole::Assistant, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_and_error_and_done_are_terminal() {
        assert!(EventPayload::Wait.is_terminal());
        assert!(EventPayload::Done.is_terminal());
        assert!(EventPayload::Error { message: "x".into() }.is_terminal());
        assert!(!EventPayload::Title { title: "x".into() }.is_terminal());
    }

    #[test]
    fn event_payload_roundtrips_through_json() {
        let payload = EventPayload::Message {
            role: MessageRole::Assistant,
            message: "hi".to_string(),
            attachments: vec![],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "message");
        let back: EventPayload = serde_json::from_value(json).unwrap();
        assert!(back.is_assistant_message());
    }
}
