use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One streamed chunk from a chat-completions backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// A partial message fragment. Keys the engine does not model are kept in
/// `extra` and merged as opaque values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Delta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum FinishReason {
    Stop,
    FunctionCall,
    Length,
    Other(String),
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" => Self::Stop,
            "function_call" => Self::FunctionCall,
            "length" => Self::Length,
            _ => Self::Other(value),
        }
    }
}

/// One streamed chunk from a plain text-completion backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// A chunk as delivered by a backend, before the response loop adapts it.
#[derive(Debug, Clone)]
pub enum RawChunk {
    Chat(ChatChunk),
    Completion(CompletionChunk),
}

/// A chunk after adaptation: exactly one fragment plus an optional finish signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_chunk_with_function_call_fragment() {
        let chunk: ChatChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":null,"function_call":{"name":"run_code","arguments":""}},"finish_reason":null}]}"#,
        )
        .unwrap();
        let choice = &chunk.choices[0];
        assert_eq!(choice.finish_reason, None);
        assert_eq!(choice.delta.content, None);
        let call = choice.delta.function_call.as_ref().unwrap();
        assert_eq!(call.name.as_deref(), Some("run_code"));
        assert_eq!(call.arguments.as_deref(), Some(""));
        assert!(choice.delta.extra.is_empty());
    }

    #[test]
    fn test_finish_reason_keeps_unknown_values() {
        let chunk: ChatChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"content_filter"}]}"#)
                .unwrap();
        assert_eq!(
            chunk.choices[0].finish_reason,
            Some(FinishReason::Other("content_filter".to_string()))
        );
    }

    #[test]
    fn test_unknown_delta_keys_are_kept() {
        let delta: Delta =
            serde_json::from_str(r#"{"content":"hi","annotations":{"source":"x"}}"#).unwrap();
        assert_eq!(delta.content.as_deref(), Some("hi"));
        assert!(delta.extra.contains_key("annotations"));
    }
}
