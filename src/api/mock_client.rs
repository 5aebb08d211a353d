use super::stream::{chunk_stream, ChunkFormat, StreamParser};
use super::{BackendRequest, ByteStream, ChatBackend, ChunkStream, ResponseMode};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Scripted backend: each request consumes the next list of SSE frames.
#[derive(Clone)]
pub struct MockApiClient {
    mode: ResponseMode,
    responses: Arc<Mutex<Vec<Vec<String>>>>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
}

impl MockApiClient {
    pub fn new(mode: ResponseMode, responses: Vec<Vec<String>>) -> Self {
        Self {
            mode,
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn structured(responses: Vec<Vec<String>>) -> Self {
        Self::new(ResponseMode::Structured, responses)
    }

    pub fn free_text(responses: Vec<Vec<String>>) -> Self {
        Self::new(ResponseMode::FreeText, responses)
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .map(|responses| responses.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for MockApiClient {
    fn mode(&self) -> ResponseMode {
        self.mode
    }

    async fn create_stream(&self, request: &BackendRequest) -> Result<ChunkStream> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("MockApiClient: request log poisoned"))?
            .push(request.clone());

        let current_sse_chunks = {
            let mut responses_guard = self
                .responses
                .lock()
                .map_err(|_| anyhow!("MockApiClient: response queue poisoned"))?;
            if responses_guard.is_empty() {
                return Err(anyhow!("MockApiClient: No more responses configured"));
            }
            responses_guard.remove(0)
        };

        let sse_byte_chunks: Vec<Result<Bytes>> = current_sse_chunks
            .into_iter()
            .map(|s| {
                let framed = if s.ends_with("\n\n") {
                    s
                } else {
                    format!("{s}\n\n")
                };
                Ok(Bytes::from(framed))
            })
            .collect();
        let bytes: ByteStream = Box::pin(stream::iter(sse_byte_chunks));

        let format = match self.mode {
            ResponseMode::Structured => ChunkFormat::Chat,
            ResponseMode::FreeText => ChunkFormat::Completion,
        };
        Ok(chunk_stream(bytes, StreamParser::new(format)))
    }
}

/// A chat frame carrying a content fragment.
pub fn content_frame(text: &str) -> String {
    chat_frame(json!({"content": text}), None)
}

/// A chat frame carrying a function-call fragment.
pub fn function_call_frame(name: Option<&str>, arguments: &str) -> String {
    let mut call = json!({"arguments": arguments});
    if let Some(name) = name {
        call["name"] = json!(name);
    }
    chat_frame(json!({"function_call": call}), None)
}

/// A chat frame with an empty delta and the given finish reason.
pub fn finish_frame(reason: &str) -> String {
    chat_frame(json!({}), Some(reason))
}

pub fn chat_frame(delta: serde_json::Value, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    });
    format!("data: {chunk}")
}

/// A text-completion frame.
pub fn text_frame(text: &str, finish_reason: Option<&str>) -> String {
    let chunk = json!({
        "choices": [{"index": 0, "text": text, "finish_reason": finish_reason}]
    });
    format!("data: {chunk}")
}

pub fn done_frame() -> String {
    "data: [DONE]".to_string()
}
