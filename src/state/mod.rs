pub mod active_block;
pub mod conversation;
pub mod delta;
pub mod fence;
pub mod message;
pub mod partial_json;

pub use active_block::{
    ActiveBlock, BlockKind, BlockTracker, BlockTransition, CodeBlock, ProseBlock,
};
pub use conversation::{
    ConversationManager, ConversationStreamUpdate, ToolApprovalRequest, TurnOutcome,
    TurnSettings, TurnSummary,
};
pub use message::{
    AssistantMessage, CodeArguments, FunctionCall, Message, MessageStore, Role,
};
