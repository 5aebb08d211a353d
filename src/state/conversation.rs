mod core;
mod history;
mod state;
mod streaming;
mod tools;


pub use state::{
    ConversationManager, ConversationStreamUpdate, ToolApprovalRequest, TurnOutcome,
    TurnSettings, TurnSummary, DECLINED_CONTENT, NO_OUTPUT, UNPARSED_ARGUMENTS_CONTENT,
};
pub(crate) use streaming::emit_stream_update;
