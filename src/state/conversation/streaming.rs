use super::ConversationStreamUpdate;
use crate::state::message::AssistantMessage;
use crate::types::{Delta, RawChunk, StreamChunk};
use tokio::sync::mpsc;

pub(crate) fn emit_stream_update(
    stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    update: ConversationStreamUpdate,
) {
    if let Some(tx) = stream_delta_tx {
        let _ = tx.send(update);
    }
}

/// Normalizes a backend chunk into the delta shape the accumulator expects.
///
/// Free-text completions carry bare text; the very first text of a message is
/// capitalized since those models tend to start mid-sentence.
pub(super) fn adapt_chunk(raw: RawChunk, message: &AssistantMessage) -> StreamChunk {
    match raw {
        RawChunk::Chat(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) => StreamChunk {
                delta: choice.delta,
                finish_reason: choice.finish_reason,
            },
            None => StreamChunk::default(),
        },
        RawChunk::Completion(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) => {
                let starts_message = message.content.as_deref().unwrap_or_default().is_empty();
                let text = if starts_message {
                    capitalize_first(&choice.text)
                } else {
                    choice.text
                };
                StreamChunk {
                    delta: Delta::text(text),
                    finish_reason: choice.finish_reason,
                }
            }
            None => StreamChunk::default(),
        },
    }
}

pub(super) fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Completion models often trail whitespace and stray `#` characters.
pub(super) fn strip_trailing_artifacts(message: &mut AssistantMessage) {
    if let Some(content) = message.content.as_mut() {
        let stripped = content.trim().trim_end_matches('#').to_string();
        *content = stripped;
    }
}
