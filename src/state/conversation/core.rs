use super::streaming::{adapt_chunk, strip_trailing_artifacts};
use super::{
    ConversationManager, ConversationStreamUpdate, TurnOutcome, TurnSummary,
    UNPARSED_ARGUMENTS_CONTENT,
};
use crate::api::{logging, ResponseMode};
use crate::state::active_block::{BlockTracker, BlockTransition};
use crate::state::delta::merge_delta;
use crate::state::fence::FenceDetector;
use crate::state::message::Message;
use crate::state::partial_json::ArgumentExtractor;
use crate::types::FinishReason;
use anyhow::{bail, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How one streamed round ended.
enum RoundStep {
    /// A code unit ran (or was rejected as unparseable); the model continues.
    Continue,
    Done(TurnOutcome),
}

impl ConversationManager {
    pub async fn send_message(
        &mut self,
        content: String,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<TurnSummary> {
        self.store.push(Message::user(content));
        self.respond(stream_delta_tx, cancel).await
    }

    /// Streams assistant rounds until the model stops asking for code.
    ///
    /// Every executed code unit appends a function message and starts another
    /// round on the same history. A decline, an interrupt, or the optional
    /// round limit ends the turn early.
    pub async fn respond(
        &mut self,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<TurnSummary> {
        let mut tool_rounds = 0usize;
        loop {
            let mut blocks = BlockTracker::new();
            let step = self.stream_round(&mut blocks, stream_delta_tx, cancel).await;
            blocks.end_active(stream_delta_tx);

            let outcome = match step? {
                RoundStep::Continue => {
                    tool_rounds += 1;
                    match self.settings.max_tool_rounds {
                        Some(max) if tool_rounds > max => TurnOutcome::RoundLimit,
                        _ => continue,
                    }
                }
                RoundStep::Done(outcome) => outcome,
            };
            return Ok(TurnSummary {
                outcome,
                tool_rounds,
            });
        }
    }

    async fn stream_round(
        &mut self,
        blocks: &mut BlockTracker,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
        cancel: &CancellationToken,
    ) -> Result<RoundStep> {
        // A cancel during approval or execution must not start another request.
        if cancel.is_cancelled() {
            return Ok(RoundStep::Done(TurnOutcome::Interrupted));
        }
        let mode = self.backend.mode();
        let request = self.build_request(mode);
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(RoundStep::Done(TurnOutcome::Interrupted)),
            stream = self.backend.create_stream(&request) => stream?,
        };

        self.store.begin_assistant();
        let previous_role = self.store.previous_role();
        let fence = FenceDetector::new(self.settings.fallback_language.clone());
        let mut extractor = ArgumentExtractor::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.store.discard_empty_assistant();
                    return Ok(RoundStep::Done(TurnOutcome::Interrupted));
                }
                next = stream.next() => next,
            };
            let Some(raw) = next else {
                break;
            };
            let raw = raw?;

            let Some(message) = self.store.tail_assistant_mut() else {
                bail!("In-progress assistant message is missing from history");
            };
            let chunk = adapt_chunk(raw, message);
            merge_delta(message, chunk.delta);

            let code_condition = match mode {
                ResponseMode::Structured => match message.function_call.as_mut() {
                    Some(call) => {
                        if let Some(arguments) = extractor.observe(&call.arguments) {
                            call.parsed_arguments = Some(arguments.clone());
                        }
                        true
                    }
                    None => false,
                },
                ResponseMode::FreeText => {
                    let scan = fence.scan(message.content.as_deref());
                    if let Some(arguments) = scan.arguments {
                        message.set_parsed_arguments(arguments);
                    }
                    scan.inside
                }
            };

            let transition = blocks.apply(code_condition, previous_role, stream_delta_tx);
            let fence_closed =
                mode == ResponseMode::FreeText && transition == BlockTransition::LeftCode;
            if fence_closed {
                if let Some(arguments) = message
                    .content
                    .as_deref()
                    .and_then(|content| fence.parse_closed_block(content))
                {
                    message.set_parsed_arguments(arguments);
                }
            }
            blocks.update(message, stream_delta_tx);

            if fence_closed || chunk.finish_reason == Some(FinishReason::FunctionCall) {
                return self.run_code_unit(blocks, stream_delta_tx).await;
            }
            if chunk.finish_reason.is_some() {
                break;
            }
        }

        if mode == ResponseMode::FreeText {
            if let Some(message) = self.store.tail_assistant_mut() {
                strip_trailing_artifacts(message);
                blocks.update(message, stream_delta_tx);
            }
        }
        blocks.end_active(stream_delta_tx);
        Ok(RoundStep::Done(TurnOutcome::Finished))
    }

    /// Gate, then dispatch, the code unit held by the tail message.
    async fn run_code_unit(
        &mut self,
        blocks: &mut BlockTracker,
        stream_delta_tx: Option<&mpsc::UnboundedSender<ConversationStreamUpdate>>,
    ) -> Result<RoundStep> {
        let Some(message) = self.store.tail_assistant() else {
            bail!("In-progress assistant message is missing from history");
        };
        if self.settings.debug {
            logging::emit_debug_function_call(message);
        }

        let Some(arguments) = message.parsed_arguments().cloned() else {
            blocks.end_active(stream_delta_tx);
            self.store
                .push(Message::function_result(UNPARSED_ARGUMENTS_CONTENT));
            return Ok(RoundStep::Continue);
        };

        if !self.settings.auto_run && !self.confirm_code_unit(blocks, stream_delta_tx).await {
            self.record_decline(blocks, stream_delta_tx);
            return Ok(RoundStep::Done(TurnOutcome::Declined));
        }

        let language = arguments
            .language
            .unwrap_or_else(|| self.settings.fallback_language.clone());
        let code = arguments.code.unwrap_or_default();
        self.dispatch_code(&language, &code, blocks, stream_delta_tx)
            .await;
        Ok(RoundStep::Continue)
    }
}
