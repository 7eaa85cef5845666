//! Folds the results of one model round into a single assistant message.

use crate::error::LLMError;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatResult, ChatRole, ChatUsage, FinishReason, StreamTag,
};

use super::handlers::ResponseHandlers;

/// What one round produced.
#[derive(Debug)]
pub(crate) struct RoundOutput {
    pub(crate) message: ChatMessage,
    pub(crate) finish_reason: Option<FinishReason>,
    pub(crate) usage: Option<ChatUsage>,
    pub(crate) response: ChatResult,
}

pub(crate) struct RoundAggregator {
    /// Still waiting for the first non-blank token.
    trim_pending: bool,
    trim: bool,
    streamed: String,
    reasoning_blocks: usize,
    message: Option<ChatMessage>,
    response: Option<ChatResult>,
    finish_reason: Option<FinishReason>,
    usage: Option<ChatUsage>,
}

impl RoundAggregator {
    pub(crate) fn new(trim_response_start: bool) -> Self {
        Self {
            trim_pending: trim_response_start,
            trim: trim_response_start,
            streamed: String::new(),
            reasoning_blocks: 0,
            message: None,
            response: None,
            finish_reason: None,
            usage: None,
        }
    }

    /// Treats a buffered result as the whole round.
    pub(crate) fn buffered(
        result: ChatResult,
        trim_response_start: bool,
        handlers: &mut ResponseHandlers,
    ) -> Result<RoundOutput, LLMError> {
        let mut aggregator = Self::new(trim_response_start);
        let message = result.first_message()?.clone();
        if let Some(text) = message.text() {
            aggregator.deliver_text(&text, handlers);
        }
        aggregator.usage = result.usage;
        aggregator.finish_reason = result.finish_reason().cloned();
        aggregator.message = Some(message);
        aggregator.response = Some(result);
        aggregator.finish(handlers)
    }

    pub(crate) fn absorb(&mut self, result: ChatResult, handlers: &mut ResponseHandlers) {
        match result.tag {
            StreamTag::Delta => {
                for delta in result.choices.iter().filter_map(|c| c.delta.as_ref()) {
                    if let Some(text) = &delta.content {
                        self.deliver_text(text, handlers);
                    }
                    for reasoning in delta.reasoning() {
                        if let Some(text) = reasoning.content.as_deref() {
                            handlers.reasoning_token(text);
                        }
                    }
                }
            }
            StreamTag::TransientBlock => {
                for message in result.choices.iter().filter_map(|c| c.message.as_ref()) {
                    for reasoning in message.reasoning() {
                        self.reasoning_blocks += 1;
                        handlers.reasoning(reasoning);
                    }
                }
            }
            StreamTag::AppendToConversation => {
                if let Some(reason) = result.finish_reason() {
                    self.finish_reason = Some(reason.clone());
                }
                if let Some(usage) = &result.usage {
                    self.absorb_usage(usage);
                }
                self.message = result.first_message().ok().cloned();
                self.response = Some(result);
            }
            StreamTag::FinishMetadata => {
                if let Some(reason) = result.finish_reason() {
                    self.finish_reason = Some(reason.clone());
                }
                if let Some(usage) = &result.usage {
                    self.absorb_usage(usage);
                }
            }
        }
    }

    fn absorb_usage(&mut self, usage: &ChatUsage) {
        match self.usage.as_mut() {
            Some(current) => current.absorb(usage),
            None => self.usage = Some(*usage),
        }
    }

    fn deliver_text(&mut self, text: &str, handlers: &mut ResponseHandlers) {
        self.streamed.push_str(text);
        if !self.trim_pending {
            handlers.token(text);
            return;
        }
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return;
        }
        self.trim_pending = false;
        handlers.token(trimmed);
    }

    /// Produces the round's message. A stream that never delivered a consolidated
    /// message falls back to the streamed text.
    pub(crate) fn finish(self, handlers: &mut ResponseHandlers) -> Result<RoundOutput, LLMError> {
        let mut message = match self.message {
            Some(message) => message,
            None if !self.streamed.is_empty() => {
                tracing::debug!("stream ended without a consolidated message");
                ChatMessage::assistant(self.streamed)
            }
            None => return Err(LLMError::NoChoices),
        };
        message.role = ChatRole::Assistant;

        if self.reasoning_blocks == 0 {
            for reasoning in message.reasoning() {
                handlers.reasoning(reasoning);
            }
        }
        if self.trim {
            trim_message_start(&mut message);
        }

        let response = self.response.unwrap_or_default();
        Ok(RoundOutput {
            message,
            finish_reason: self.finish_reason,
            usage: self.usage,
            response,
        })
    }
}

/// Strips leading whitespace from `content` and the first text part alike.
fn trim_message_start(message: &mut ChatMessage) {
    if let Some(content) = message.content.as_mut() {
        let trimmed = content.trim_start();
        if trimmed.len() != content.len() {
            *content = trimmed.to_string();
        }
    }
    let first_text = message
        .parts
        .iter_mut()
        .flatten()
        .find_map(|part| match part {
            ChatMessagePart::Text(text) => Some(text),
            _ => None,
        });
    if let Some(part) = first_text {
        let trimmed = part.text.trim_start();
        if trimmed.len() != part.text.len() {
            part.text = trimmed.to_string();
        }
    }
}
