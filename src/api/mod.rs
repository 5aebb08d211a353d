pub mod client;
pub mod completion;
pub mod logging;
pub mod mock_client;
pub mod prompt;
pub mod stream;

pub use client::ApiClient;
pub use completion::CompletionClient;
pub use mock_client::MockApiClient;

use crate::config::{BackendKind, Config};
use crate::state::message::Message;
use crate::types::RawChunk;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<RawChunk>> + Send>>;

/// How a backend signals code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Native function calls carrying `{language, code}` arguments.
    Structured,
    /// Prose only; code arrives in fenced blocks.
    FreeText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    Messages {
        system: String,
        messages: Vec<Message>,
    },
    Prompt {
        prompt: String,
        max_tokens: usize,
    },
}

/// A model endpoint that streams one assistant message per request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn mode(&self) -> ResponseMode;

    async fn create_stream(&self, request: &BackendRequest) -> Result<ChunkStream>;
}

pub fn build_backend(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config.backend {
        BackendKind::Chat => Arc::new(ApiClient::new(config)?),
        BackendKind::Completion => Arc::new(CompletionClient::new(config)?),
    };
    Ok(backend)
}
