use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the single function the model can call.
pub const RUN_CODE_FUNCTION: &str = "run_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Function,
}

/// One conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    Assistant(AssistantMessage),
    Function {
        name: String,
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// A `run_code` result entry.
    pub fn function_result(content: impl Into<String>) -> Self {
        Self::Function {
            name: RUN_CODE_FUNCTION.to_string(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User { .. } => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::Function { .. } => Role::Function,
        }
    }

    /// Text content of the entry, if any has been produced.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::User { content } | Self::Function { content, .. } => Some(content),
            Self::Assistant(message) => message.content.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssistantMessage {
    pub fn parsed_arguments(&self) -> Option<&CodeArguments> {
        self.function_call
            .as_ref()
            .and_then(|call| call.parsed_arguments.as_ref())
    }

    /// Stores freshly parsed arguments, creating the function call record when
    /// the backend never produced one (free-text mode).
    pub fn set_parsed_arguments(&mut self, arguments: CodeArguments) {
        let call = self.function_call.get_or_insert_with(|| FunctionCall {
            name: RUN_CODE_FUNCTION.to_string(),
            ..FunctionCall::default()
        });
        call.parsed_arguments = Some(arguments);
    }

    /// True until any fragment has landed.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.function_call.is_none() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_arguments: Option<CodeArguments>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CodeArguments {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            code: Some(code.into()),
        }
    }
}

/// Ordered conversation history. Only a trailing assistant entry can be
/// mutated; everything before it is settled history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Opens a new in-progress assistant entry at the tail.
    pub fn begin_assistant(&mut self) {
        self.messages
            .push(Message::Assistant(AssistantMessage::default()));
    }

    pub fn tail_assistant(&self) -> Option<&AssistantMessage> {
        match self.messages.last() {
            Some(Message::Assistant(message)) => Some(message),
            _ => None,
        }
    }

    pub fn tail_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match self.messages.last_mut() {
            Some(Message::Assistant(message)) => Some(message),
            _ => None,
        }
    }

    /// Role of the entry just before the tail.
    pub fn previous_role(&self) -> Option<Role> {
        let len = self.messages.len();
        if len < 2 {
            return None;
        }
        Some(self.messages[len - 2].role())
    }

    /// Drops the tail assistant entry if nothing was streamed into it. Chat
    /// endpoints reject an assistant message with neither content nor a call.
    pub fn discard_empty_assistant(&mut self) {
        if self.tail_assistant().is_some_and(AssistantMessage::is_empty) {
            self.messages.pop();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }
}
