use super::streaming::emit_stream_update;
use super::{
    ConversationManager, ConversationStreamUpdate, ToolApprovalRequest, DECLINED_CONTENT,
    NO_OUTPUT,
};
use crate::state::active_block::BlockTracker;
use crate::state::message::Message;
use tokio::sync::{mpsc, oneshot};

impl ConversationManager {
    /// Asks the operator whether the drafted code unit may run.
    ///
    /// The draft block is ended first so the question appears below a
    /// settled rendering. On approval a fresh code block is opened for the
    /// execution itself.
    pub(super) async fn confirm_code_unit(
        &mut self,
        blocks: &mut BlockTracker,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    ) -> bool {
        blocks.end_current(stream_delta_tx);
        let (language, code) = blocks
            .code_block()
            .map(|block| (block.language.clone(), block.code.clone()))
            .unwrap_or_default();

        let language_label = language
            .clone()
            .unwrap_or_else(|| self.settings.fallback_language.clone());
        let approved = request_code_approval(&language_label, &code, stream_delta_tx).await;
        if approved {
            blocks.reopen_code(language, code, stream_delta_tx);
        }
        approved
    }

    pub(super) fn record_decline(
        &mut self,
        blocks: &mut BlockTracker,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    ) {
        blocks.end_active(stream_delta_tx);
        self.store.push(Message::function_result(DECLINED_CONTENT));
    }

    /// Runs a code unit through the session's executor for `language` and
    /// records exactly one function message with the result.
    ///
    /// Executor failures (unknown language, interpreter missing, timeout) are
    /// recorded as the output text so the model can react to them.
    pub(super) async fn dispatch_code(
        &mut self,
        language: &str,
        code: &str,
        blocks: &mut BlockTracker,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    ) {
        let mut forward_line = move |line: &str| {
            emit_stream_update(
                stream_delta_tx,
                ConversationStreamUpdate::CodeOutput(line.to_string()),
            );
        };

        let result = match self.registry.get_or_create(language) {
            Ok(executor) => executor.execute(code, &mut forward_line).await,
            Err(error) => Err(error),
        };
        let output = match result {
            Ok(output) => output,
            Err(error) => {
                let text = format!("{error:#}");
                forward_line(&text);
                text
            }
        };

        if let Some(block) = blocks.code_block_mut() {
            block.output = output.clone();
        }
        blocks.end_active(stream_delta_tx);

        let content = if output.trim().is_empty() {
            NO_OUTPUT.to_string()
        } else {
            output
        };
        self.store.push(Message::function_result(content));
    }
}

/// Sends the approval request and waits for the operator. No channel, a
/// closed channel, or a dropped responder all count as a decline.
pub(super) async fn request_code_approval(
    language: &str,
    code: &str,
    stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
) -> bool {
    let Some(tx) = stream_delta_tx else {
        return false;
    };

    let (response_tx, response_rx) = oneshot::channel();
    let request = ToolApprovalRequest {
        language: language.to_string(),
        code: code.to_string(),
        response_tx,
    };

    if tx
        .send(ConversationStreamUpdate::ToolApprovalRequest(request))
        .is_err()
    {
        return false;
    }

    response_rx.await.unwrap_or(false)
}
