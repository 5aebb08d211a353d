use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::{chunk_stream, ChunkFormat, StreamParser};
use super::{BackendRequest, ByteStream, ChatBackend, ChunkStream, ResponseMode};
use crate::config::Config;
use crate::state::message::{Message, RUN_CODE_FUNCTION};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

/// Chat-completions backend with native function calling.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    temperature: f32,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: chat_completions_url(&config.api_url),
            temperature: config.temperature,
        })
    }

    fn payload(&self, system: &str, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": openai_messages(messages, system),
            "functions": [run_code_function_schema()],
            "function_call": "auto",
        })
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    fn mode(&self) -> ResponseMode {
        ResponseMode::Structured
    }

    async fn create_stream(&self, request: &BackendRequest) -> Result<ChunkStream> {
        let BackendRequest::Messages { system, messages } = request else {
            bail!("Chat backend expects a message history, not a rendered prompt");
        };
        let payload = self.payload(system, messages);
        if debug_payload_enabled() {
            emit_debug_payload(&self.api_url, &payload);
        }

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        let bytes = send_streaming(request, &self.api_url).await?;
        Ok(chunk_stream(bytes, StreamParser::new(ChunkFormat::Chat)))
    }
}

/// Sends a streaming request and maps transport failures to readable errors.
pub(super) async fn send_streaming(
    request: reqwest::RequestBuilder,
    request_url: &str,
) -> Result<ByteStream> {
    let response = request
        .send()
        .await
        .map_err(|error| map_api_request_error(error, request_url))?
        .error_for_status()
        .map_err(|error| map_api_request_error(error, request_url))?;

    let request_url_for_stream = request_url.to_string();
    let stream = response.bytes_stream().map(move |item| {
        item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
    });
    Ok(Box::pin(stream))
}

pub(super) fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update CODELOOP_COMPLETION_URL / CODELOOP_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}

fn chat_completions_url(api_url: &str) -> String {
    let normalized = api_url.trim().trim_end_matches('/');
    if normalized.ends_with("/v1") {
        return format!("{normalized}/chat/completions");
    }
    normalized.to_string()
}

/// The single function offered to the model.
pub fn run_code_function_schema() -> Value {
    json!({
        "name": RUN_CODE_FUNCTION,
        "description": "Executes code on the user's machine and returns the output",
        "parameters": {
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "description": "The programming language",
                    "enum": ["python", "shell", "applescript", "javascript"]
                },
                "code": {
                    "type": "string",
                    "description": "The code to execute"
                }
            },
            "required": ["language", "code"]
        }
    })
}

pub fn openai_messages(messages: &[Message], system_prompt: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(json!({
        "role": "system",
        "content": system_prompt
    }));

    for message in messages {
        out.push(openai_message(message));
    }

    out
}

fn openai_message(message: &Message) -> Value {
    match message {
        Message::User { content } => json!({
            "role": "user",
            "content": content
        }),
        Message::Function { name, content } => json!({
            "role": "function",
            "name": name,
            "content": content
        }),
        Message::Assistant(assistant) => {
            let mut value = json!({
                "role": "assistant",
                "content": assistant.content
            });
            if let Some(call) = &assistant.function_call {
                // Calls recorded from fenced blocks only carry parsed arguments.
                let arguments = if call.arguments.trim().is_empty() {
                    call.parsed_arguments
                        .as_ref()
                        .and_then(|parsed| serde_json::to_string(parsed).ok())
                        .unwrap_or_default()
                } else {
                    call.arguments.clone()
                };
                value["function_call"] = json!({
                    "name": call.name,
                    "arguments": arguments
                });
            }
            value
        }
    }
}
