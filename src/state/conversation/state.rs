use crate::api::{prompt, ChatBackend, ResponseMode};
use crate::config::Config;
use crate::state::active_block::BlockKind;
use crate::state::message::{Message, MessageStore};
use crate::tools::ExecutorRegistry;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Function-message content recorded when the operator declines a code unit.
pub const DECLINED_CONTENT: &str = "User decided not to run this code.";
/// Function-message content recorded when an execution printed nothing.
pub const NO_OUTPUT: &str = "No output";
/// Function-message content recorded when a finished call has no usable arguments.
pub const UNPARSED_ARGUMENTS_CONTENT: &str =
    "The run_code arguments could not be parsed as JSON with `language` and `code` fields.";

pub enum ConversationStreamUpdate {
    /// Visual break before code that follows a user or function message.
    Separator,
    BlockStart(BlockKind),
    ProseDelta(String),
    CodeSnapshot {
        language: Option<String>,
        code: String,
    },
    CodeOutput(String),
    BlockEnd(BlockKind),
    ToolApprovalRequest(ToolApprovalRequest),
}

pub struct ToolApprovalRequest {
    pub language: String,
    pub code: String,
    pub response_tx: oneshot::Sender<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model finished without asking for (more) code.
    Finished,
    Declined,
    Interrupted,
    /// The configured continuation limit was hit after an execution.
    RoundLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSummary {
    pub outcome: TurnOutcome,
    pub tool_rounds: usize,
}

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub auto_run: bool,
    pub debug: bool,
    pub fallback_language: String,
    pub max_tool_rounds: Option<usize>,
    pub max_tokens: usize,
    pub system_message: String,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            auto_run: false,
            debug: false,
            fallback_language: "python".to_string(),
            max_tool_rounds: None,
            max_tokens: 1_000,
            system_message: prompt::DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auto_run: config.auto_run,
            debug: config.debug,
            fallback_language: config.fallback_language.clone(),
            max_tool_rounds: config.max_tool_rounds,
            max_tokens: config.max_tokens,
            ..Self::default()
        }
    }
}

pub struct ConversationManager {
    pub(super) backend: Arc<dyn ChatBackend>,
    pub(super) store: MessageStore,
    pub(super) registry: ExecutorRegistry,
    pub(super) settings: TurnSettings,
}

impl ConversationManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: ExecutorRegistry,
        settings: TurnSettings,
    ) -> Self {
        Self {
            backend,
            store: MessageStore::new(),
            registry,
            settings,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn mode(&self) -> ResponseMode {
        self.backend.mode()
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn debug(&self) -> bool {
        self.settings.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.settings.debug = debug;
    }

    /// Forgets the history and shuts down every interpreter session.
    pub fn reset(&mut self) {
        self.store.clear();
        self.registry.clear();
    }

    /// Replaces the history with previously saved messages. Interpreter state
    /// is left alone.
    pub fn load(&mut self, messages: Vec<Message>) {
        self.store.replace(messages);
    }
}
