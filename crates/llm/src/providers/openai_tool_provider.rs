//! OpenAI (chat completions API) implementation of [`ToolAwareLlmProvider`].
//!
//! Supports streaming tool use via SSE, translating between the OpenAI chat
//! completions format and the provider-agnostic [`StreamEvent`] /
//! [`ConversationMessage`] types.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::pin::Pin;
use tracing::{debug, trace};

use stupid_tool_runtime::{
    conversation::ConversationMessage,
    provider::{LlmError, ToolAwareLlmProvider},
    stream::{StopReason, StreamEvent},
    tool::ToolDefinition,
};

/// OpenAI-compatible provider with streaming tool-use support.
///
/// Targets the `/v1/chat/completions` endpoint with `stream: true`; works
/// against OpenAI itself and any OpenAI-compatible gateway (the `base_url`
/// is configurable for exactly that reason).
pub struct OpenAiToolProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiToolProvider {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    pub fn with_defaults(api_key: String) -> Self {
        Self::new(
            api_key,
            "gpt-4o".to_string(),
            "https://api.openai.com".to_string(),
        )
    }
}

fn tool_definition_to_openai(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

fn message_to_openai(msg: &ConversationMessage) -> Value {
    match msg {
        ConversationMessage::User(text) => json!({
            "role": "user",
            "content": text,
        }),
        ConversationMessage::Assistant(content) => {
            let mut obj = serde_json::Map::new();
            obj.insert("role".into(), json!("assistant"));
            obj.insert(
                "content".into(),
                content
                    .text
                    .as_ref()
                    .map(|t| json!(t))
                    .unwrap_or(Value::Null),
            );
            if !content.tool_calls.is_empty() {
                let calls: Vec<Value> = content
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.input.to_string(),
                            }
                        })
                    })
                    .collect();
                obj.insert("tool_calls".into(), json!(calls));
            }
            Value::Object(obj)
        }
        ConversationMessage::ToolResult(result) => json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        }),
    }
}

/// Tracks in-progress tool calls by their `choices[0].delta.tool_calls[].index`
/// so argument deltas (which only carry the index, not the call id) can be
/// routed to the right `ToolCallDelta` id.
#[derive(Default)]
struct ToolCallTracker {
    index_to_id: HashMap<u64, String>,
}

impl ToolCallTracker {
    fn register(&mut self, index: u64, id: String) {
        self.index_to_id.insert(index, id);
    }

    fn id_for(&self, index: u64) -> Option<String> {
        self.index_to_id.get(&index).cloned()
    }
}

/// Parse a single OpenAI chat-completion streaming chunk (`data: {...}`) into
/// zero or more provider-agnostic stream events.
fn parse_chunk(data: &str, tracker: &mut ToolCallTracker) -> Vec<StreamEvent> {
    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return vec![],
    };

    let mut events = Vec::new();
    let Some(choice) = parsed["choices"].get(0) else {
        return events;
    };

    if let Some(content) = choice["delta"]["content"].as_str() {
        if !content.is_empty() {
            events.push(StreamEvent::TextDelta {
                text: content.to_string(),
            });
        }
    }

    if let Some(tool_calls) = choice["delta"]["tool_calls"].as_array() {
        for tc in tool_calls {
            let index = tc["index"].as_u64().unwrap_or(0);
            if let Some(id) = tc["id"].as_str() {
                tracker.register(index, id.to_string());
                if let Some(name) = tc["function"]["name"].as_str() {
                    events.push(StreamEvent::ToolCallStart {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            if let Some(args) = tc["function"]["arguments"].as_str() {
                if let Some(id) = tracker.id_for(index) {
                    events.push(StreamEvent::ToolCallDelta {
                        id,
                        arguments_delta: args.to_string(),
                    });
                }
            }
        }
    }

    if let Some(reason) = choice["finish_reason"].as_str() {
        let stop_reason = match reason {
            "stop" => StopReason::EndTurn,
            "tool_calls" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };
        if stop_reason == StopReason::ToolUse {
            for id in tracker.index_to_id.values() {
                events.push(StreamEvent::ToolCallEnd { id: id.clone() });
            }
        }
        events.push(StreamEvent::MessageEnd { stop_reason });
    }

    events
}

#[async_trait]
impl ToolAwareLlmProvider for OpenAiToolProvider {
    async fn stream_with_tools(
        &self,
        messages: Vec<ConversationMessage>,
        system_prompt: Option<String>,
        tools: Vec<ToolDefinition>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut api_messages = Vec::new();
        if let Some(prompt) = system_prompt {
            api_messages.push(json!({ "role": "system", "content": prompt }));
        }
        api_messages.extend(messages.iter().map(message_to_openai));

        let mut body = json!({
            "model": self.model,
            "messages": api_messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": true,
        });
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools.iter().map(tool_definition_to_openai).collect();
            body["tools"] = json!(tool_defs);
        }

        debug!(url = %url, model = %self.model, "openai request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                401 => LlmError::AuthError,
                429 => {
                    let retry_after_secs = serde_json::from_str::<Value>(&text)
                        .ok()
                        .and_then(|v| v["error"]["retry_after"].as_u64())
                        .unwrap_or(30);
                    LlmError::RateLimited { retry_after_secs }
                }
                _ => LlmError::ApiError {
                    status,
                    message: text,
                },
            });
        }

        let byte_stream = response.bytes_stream();
        let state = (byte_stream, String::new(), ToolCallTracker::default(), false);

        let events = stream::unfold(state, |(mut byte_stream, mut buf, mut tracker, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(newline_pos) = buf.find('\n') {
                    let line = buf[..newline_pos].trim_end_matches('\r').to_string();
                    buf.drain(..=newline_pos);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        return Some((vec![], (byte_stream, buf, tracker, true)));
                    }
                    let evs = parse_chunk(payload, &mut tracker);
                    if !evs.is_empty() {
                        return Some((evs, (byte_stream, buf, tracker, false)));
                    }
                    continue;
                }

                match byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        buf.push_str(&String::from_utf8_lossy(&chunk));
                        continue;
                    }
                    Some(Err(e)) => {
                        trace!(error = %e, "openai stream read error");
                        return Some((
                            vec![StreamEvent::Error {
                                message: e.to_string(),
                            }],
                            (byte_stream, buf, tracker, true),
                        ));
                    }
                    None => return Some((vec![], (byte_stream, buf, tracker, true))),
                }
            }
        })
        .flat_map(|evs| stream::iter(evs.into_iter().map(Ok)));

        Ok(Box::pin(events))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definition_translation() {
        let tool = ToolDefinition {
            name: "bash_execute".to_string(),
            description: "run a shell command".to_string(),
            input_schema: json!({"type": "object"}),
        };
        let v = tool_definition_to_openai(&tool);
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "bash_execute");
    }

    #[test]
    fn test_user_message_translation() {
        let v = message_to_openai(&ConversationMessage::User("hi".to_string()));
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hi");
    }

    #[test]
    fn test_text_delta_chunk() {
        let mut tracker = ToolCallTracker::default();
        let data = r#"{"choices":[{"delta":{"content":"hello"}}]}"#;
        let events = parse_chunk(data, &mut tracker);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::TextDelta { text } => assert_eq!(text, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_start_and_delta() {
        let mut tracker = ToolCallTracker::default();
        let start = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"bash_execute","arguments":""}}]}}]}"#;
        let events = parse_chunk(start, &mut tracker);
        assert!(matches!(&events[0], StreamEvent::ToolCallStart { id, name } if id == "call_1" && name == "bash_execute"));

        let delta = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"cmd"}}]}}]}"#;
        let events = parse_chunk(delta, &mut tracker);
        assert!(matches!(&events[0], StreamEvent::ToolCallDelta { id, .. } if id == "call_1"));
    }

    #[test]
    fn test_finish_reason_tool_calls_emits_end_and_message_end() {
        let mut tracker = ToolCallTracker::default();
        tracker.register(0, "call_1".to_string());
        let data = r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#;
        let events = parse_chunk(data, &mut tracker);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolCallEnd { id } if id == "call_1")));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::MessageEnd { stop_reason } if *stop_reason == StopReason::ToolUse)));
    }

    #[test]
    fn test_finish_reason_stop() {
        let mut tracker = ToolCallTracker::default();
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let events = parse_chunk(data, &mut tracker);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::MessageEnd { stop_reason }) if *stop_reason == StopReason::EndTurn
        ));
    }
}
