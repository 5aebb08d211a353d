use super::conversation::{emit_stream_update, ConversationStreamUpdate};
use super::message::{AssistantMessage, Role};
use tokio::sync::mpsc;

type UpdateSender<'a> = Option<&'a mpsc::UnboundedSender<ConversationStreamUpdate>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Prose,
    Code,
}

/// Streams assistant prose as it grows.
#[derive(Debug, Default)]
pub struct ProseBlock {
    rendered: String,
    ended: bool,
}

impl ProseBlock {
    fn update_from_message(&mut self, message: &AssistantMessage, tx: UpdateSender<'_>) {
        if self.ended {
            return;
        }
        let content = message.content.as_deref().unwrap_or_default();
        match content.strip_prefix(self.rendered.as_str()) {
            Some("") => {}
            Some(suffix) => {
                emit_stream_update(tx, ConversationStreamUpdate::ProseDelta(suffix.to_string()));
                self.rendered.push_str(suffix);
            }
            // content was rewritten (trailing artifact strip); nothing new to show
            None => self.rendered = content.to_string(),
        }
    }
}

/// A code unit: drafted while streaming, then run.
#[derive(Debug, Default)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
    pub output: String,
    ended: bool,
}

impl CodeBlock {
    fn update_from_message(&mut self, message: &AssistantMessage, tx: UpdateSender<'_>) {
        if self.ended {
            return;
        }
        let Some(arguments) = message.parsed_arguments() else {
            return;
        };
        let code = arguments.code.clone().unwrap_or_default();
        if arguments.language == self.language && code == self.code {
            return;
        }
        self.language = arguments.language.clone();
        self.code = code;
        self.emit_snapshot(tx);
    }

    fn emit_snapshot(&self, tx: UpdateSender<'_>) {
        emit_stream_update(
            tx,
            ConversationStreamUpdate::CodeSnapshot {
                language: self.language.clone(),
                code: self.code.clone(),
            },
        );
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

#[derive(Debug)]
pub enum ActiveBlock {
    Prose(ProseBlock),
    Code(CodeBlock),
}

impl ActiveBlock {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Prose(_) => BlockKind::Prose,
            Self::Code(_) => BlockKind::Code,
        }
    }

    pub fn update_from_message(&mut self, message: &AssistantMessage, tx: UpdateSender<'_>) {
        match self {
            Self::Prose(block) => block.update_from_message(message, tx),
            Self::Code(block) => block.update_from_message(message, tx),
        }
    }

    /// Finalizes the block. Ending twice is a no-op.
    pub fn end(&mut self, tx: UpdateSender<'_>) {
        let kind = self.kind();
        let ended = match self {
            Self::Prose(block) => &mut block.ended,
            Self::Code(block) => &mut block.ended,
        };
        if *ended {
            return;
        }
        *ended = true;
        emit_stream_update(tx, ConversationStreamUpdate::BlockEnd(kind));
    }

    pub fn is_ended(&self) -> bool {
        match self {
            Self::Prose(block) => block.ended,
            Self::Code(block) => block.ended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTransition {
    Unchanged,
    EnteredCode,
    LeftCode,
}

/// Tracks the single active block of a streamed response and switches it as
/// the response moves between prose and code.
#[derive(Debug, Default)]
pub struct BlockTracker {
    active: Option<ActiveBlock>,
    in_code: bool,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveBlock> {
        self.active.as_ref()
    }

    pub fn in_code(&self) -> bool {
        self.in_code
    }

    /// Applies the code-region condition observed for the latest fragment.
    ///
    /// Leaving a code region does not end the code block: the completed unit
    /// is handed to confirmation and dispatch, which end it themselves.
    pub fn apply(
        &mut self,
        code_condition: bool,
        previous_role: Option<Role>,
        tx: UpdateSender<'_>,
    ) -> BlockTransition {
        if code_condition {
            let entered = !self.in_code;
            if entered {
                self.end_active(tx);
                if matches!(previous_role, Some(Role::User | Role::Function)) {
                    emit_stream_update(tx, ConversationStreamUpdate::Separator);
                }
                self.open(ActiveBlock::Code(CodeBlock::default()), tx);
            }
            self.in_code = true;
            return if entered {
                BlockTransition::EnteredCode
            } else {
                BlockTransition::Unchanged
            };
        }

        let left = self.in_code;
        self.in_code = false;
        if self.active.is_none() {
            self.open(ActiveBlock::Prose(ProseBlock::default()), tx);
        }
        if left {
            BlockTransition::LeftCode
        } else {
            BlockTransition::Unchanged
        }
    }

    pub fn update(&mut self, message: &AssistantMessage, tx: UpdateSender<'_>) {
        if let Some(block) = self.active.as_mut() {
            block.update_from_message(message, tx);
        }
    }

    /// Ends the active block but keeps it readable.
    pub fn end_current(&mut self, tx: UpdateSender<'_>) {
        if let Some(block) = self.active.as_mut() {
            block.end(tx);
        }
    }

    /// Ends the active block and returns to idle.
    pub fn end_active(&mut self, tx: UpdateSender<'_>) {
        if let Some(mut block) = self.active.take() {
            block.end(tx);
        }
    }

    /// Replaces the active block with a fresh code block carrying the given
    /// unit, used to show execution separately from the draft.
    pub fn reopen_code(&mut self, language: Option<String>, code: String, tx: UpdateSender<'_>) {
        self.end_active(tx);
        let block = CodeBlock {
            language,
            code,
            ..CodeBlock::default()
        };
        self.open(ActiveBlock::Code(block), tx);
        if let Some(block) = self.code_block() {
            block.emit_snapshot(tx);
        }
    }

    pub fn code_block(&self) -> Option<&CodeBlock> {
        match self.active.as_ref() {
            Some(ActiveBlock::Code(block)) => Some(block),
            _ => None,
        }
    }

    pub fn code_block_mut(&mut self) -> Option<&mut CodeBlock> {
        match self.active.as_mut() {
            Some(ActiveBlock::Code(block)) => Some(block),
            _ => None,
        }
    }

    fn open(&mut self, block: ActiveBlock, tx: UpdateSender<'_>) {
        emit_stream_update(tx, ConversationStreamUpdate::BlockStart(block.kind()));
        self.active = Some(block);
    }
}
