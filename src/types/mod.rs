pub mod api;

pub use api::{
    ChatChunk, ChunkChoice, CompletionChoice, CompletionChunk, Delta, FinishReason,
    FunctionCallDelta, RawChunk, StreamChunk,
};
