use super::ConversationManager;
use crate::api::{logging, prompt, BackendRequest, ResponseMode};

impl ConversationManager {
    /// Shapes the settled history for the active backend.
    ///
    /// Structured backends get the messages as-is; free-text backends get a
    /// single rendered prompt from the prompt adapter.
    pub(super) fn build_request(&self, mode: ResponseMode) -> BackendRequest {
        let system = prompt::system_message(&self.settings.system_message, mode);
        match mode {
            ResponseMode::Structured => {
                if self.settings.debug {
                    logging::emit_debug_messages(self.store.messages());
                }
                BackendRequest::Messages {
                    system,
                    messages: self.store.messages().to_vec(),
                }
            }
            ResponseMode::FreeText => {
                let prompt = prompt::build_prompt(&system, self.store.messages());
                if self.settings.debug {
                    logging::emit_debug_prompt(&prompt);
                }
                BackendRequest::Prompt {
                    prompt,
                    max_tokens: self.settings.max_tokens,
                }
            }
        }
    }
}
