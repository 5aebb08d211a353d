use super::client::send_streaming;
use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::{chunk_stream, ChunkFormat, StreamParser};
use super::{BackendRequest, ChatBackend, ChunkStream, ResponseMode};
use crate::config::Config;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// End-of-sequence marker of the instruction prompt format.
pub const STOP_SEQUENCE: &str = "</s>";

/// Text-completion backend. It only ever produces prose; code is written as
/// fenced markdown blocks.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    completion_url: String,
    temperature: f32,
}

impl CompletionClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            completion_url: config.completion_url.trim().to_string(),
            temperature: config.temperature,
        })
    }

    fn payload(&self, prompt: &str, max_tokens: usize) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "stream": true,
            "stop": [STOP_SEQUENCE],
        })
    }
}

#[async_trait]
impl ChatBackend for CompletionClient {
    fn mode(&self) -> ResponseMode {
        ResponseMode::FreeText
    }

    async fn create_stream(&self, request: &BackendRequest) -> Result<ChunkStream> {
        let BackendRequest::Prompt { prompt, max_tokens } = request else {
            bail!("Completion backend expects a rendered prompt, not a message history");
        };
        let payload = self.payload(prompt, *max_tokens);
        if debug_payload_enabled() {
            emit_debug_payload(&self.completion_url, &payload);
        }

        let mut request = self
            .http
            .post(&self.completion_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        let bytes = send_streaming(request, &self.completion_url).await?;
        Ok(chunk_stream(bytes, StreamParser::new(ChunkFormat::Completion)))
    }
}
