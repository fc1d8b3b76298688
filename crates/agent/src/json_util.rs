//! Tolerant extraction of a JSON object from an LLM's final text response.
//! Models routinely wrap the JSON the prompt asked for in prose or a
//! ```` ```json ```` fence; this strips that framing before parsing.

use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("could not parse JSON from model response: {0}")]
pub struct JsonExtractError(String);

pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, JsonExtractError> {
    let candidate = find_json_slice(text).unwrap_or(text);
    serde_json::from_str(candidate).map_err(|e| JsonExtractError(format!("{e}: {candidate}")))
}

fn find_json_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let end = text.as_bytes().iter().rposition(|&b| b == close)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parses into a raw `Value` first, as a loose sanity check before typed
/// deserialization elsewhere.
pub fn extract_json_value(text: &str) -> Result<Value, JsonExtractError> {
    extract_json(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Foo {
        a: u32,
    }

    #[test]
    fn extracts_json_wrapped_in_markdown_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nHope that helps.";
        let foo: Foo = extract_json(text).unwrap();
        assert_eq!(foo.a, 1);
    }

    #[test]
    fn extracts_plain_json() {
        let foo: Foo = extract_json("{\"a\": 42}").unwrap();
        assert_eq!(foo.a, 42);
    }
}
